//! Distribution report structures for exit waterfalls

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::holding::{Holding, SecurityKind};

/// Cash returned to one holding at exit, by layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingDistribution {
    pub holding_id: String,
    pub holder: String,
    pub security: SecurityKind,

    /// Converted at a financing round or at exit
    pub converted: bool,

    pub subscription_amount: f64,
    pub ownership_percentage: Option<f64>,

    // Layers
    pub preference_amount: f64,
    pub participation_amount: f64,
    pub common_distribution: f64,
    pub token_distribution: f64,

    // Totals
    #[serde(rename = "return")]
    pub total_return: f64,
    /// return / subscription; None when nothing was invested
    pub multiple: Option<f64>,
    pub percent_of_exit: f64,
}

impl HoldingDistribution {
    pub(crate) fn empty(holding: &Holding) -> Self {
        Self {
            holding_id: holding.id.clone(),
            holder: holding.holder.clone(),
            security: holding.kind(),
            converted: holding.converted(),
            subscription_amount: holding.subscription_amount,
            ownership_percentage: holding.ownership_percentage,
            preference_amount: 0.0,
            participation_amount: 0.0,
            common_distribution: 0.0,
            token_distribution: 0.0,
            total_return: 0.0,
            multiple: None,
            percent_of_exit: 0.0,
        }
    }

    /// Sum the layers and derive multiple and share of exit
    pub(crate) fn finalize(&mut self, exit_value: f64) {
        self.total_return =
            self.preference_amount + self.participation_amount + self.common_distribution + self.token_distribution;
        self.multiple = if self.subscription_amount > 0.0 {
            Some(self.total_return / self.subscription_amount)
        } else {
            None
        };
        self.percent_of_exit = if exit_value > 0.0 {
            self.total_return / exit_value * 100.0
        } else {
            0.0
        };
    }
}

/// Full exit distribution across all holdings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionReport {
    pub exit_value: f64,
    pub total_token_supply: f64,
    pub rows: Vec<HoldingDistribution>,

    // Layer pools after any haircut
    pub preference_pool: f64,
    pub participation_pool: f64,
    pub common_pool: f64,
    pub token_pool: f64,

    /// Scalar applied to every preference when they exceeded the exit
    pub preference_haircut: Option<f64>,
    /// Scalar applied to participation when it exceeded what was left
    pub participation_haircut: Option<f64>,

    /// Residual with no eligible recipient (only tokens held)
    pub unallocated: f64,

    /// Sum of returns excluding token holdings
    pub equity_total: f64,
    /// Sum of all returns, tokens included
    pub total_returns: f64,
}

impl DistributionReport {
    /// All-zero report, used for degenerate exit values
    pub fn zero(holdings: &[Holding], exit_value: f64, total_token_supply: f64) -> Self {
        Self {
            exit_value,
            total_token_supply,
            rows: holdings.iter().map(HoldingDistribution::empty).collect(),
            preference_pool: 0.0,
            participation_pool: 0.0,
            common_pool: 0.0,
            token_pool: 0.0,
            preference_haircut: None,
            participation_haircut: None,
            unallocated: 0.0,
            equity_total: 0.0,
            total_returns: 0.0,
        }
    }

    pub fn row(&self, holding_id: &str) -> Option<&HoldingDistribution> {
        self.rows.iter().find(|r| r.holding_id == holding_id)
    }

    /// Write one CSV line per holding
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}
