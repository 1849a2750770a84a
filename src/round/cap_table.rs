//! Company cap table state between rounds

use serde::{Deserialize, Serialize};

use crate::error::{CapTableError, Result};
use crate::holding::Holding;

/// Holdings plus the company-level figures a round is applied against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapTable {
    pub holdings: Vec<Holding>,

    /// Current company valuation
    pub valuation: f64,

    /// Notional fully diluted share count, for per-share reporting only.
    /// None uses `EngineConfig::default_total_shares`.
    #[serde(default)]
    pub total_shares: Option<f64>,
}

impl CapTable {
    pub fn new(holdings: Vec<Holding>, valuation: f64) -> Self {
        Self {
            holdings,
            valuation,
            total_shares: None,
        }
    }

    pub fn with_total_shares(mut self, total_shares: f64) -> Self {
        self.total_shares = Some(total_shares);
        self
    }

    /// Sum of ownership across holdings that carry it
    pub fn ownership_sum(&self) -> f64 {
        ownership_sum(&self.holdings)
    }

    pub fn holding(&self, id: &str) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.id == id)
    }
}

pub(crate) fn ownership_sum(holdings: &[Holding]) -> f64 {
    holdings
        .iter()
        .filter(|h| !h.is_token())
        .filter_map(|h| h.ownership_percentage)
        .sum()
}

/// Give every equity holding an ownership fraction and make the total one.
///
/// With no allocation at all, ownership is assigned by subscription share
/// among common and preferred holdings. A partial allocation is rejected
/// rather than guessed at.
pub(crate) fn prepare_ownership(holdings: &mut [Holding], tolerance: f64) -> Result<()> {
    let unallocated: Vec<&str> = holdings
        .iter()
        .filter(|h| h.security.is_equity() && h.ownership_percentage.is_none())
        .map(|h| h.id.as_str())
        .collect();
    let equity_count = holdings.iter().filter(|h| h.security.is_equity()).count();

    if !unallocated.is_empty() {
        if unallocated.len() < equity_count {
            return Err(CapTableError::inconsistent(
                unallocated[0],
                "equity holding has no ownership while others do",
            ));
        }

        let total_investment: f64 = holdings
            .iter()
            .filter(|h| h.security.is_equity())
            .map(|h| h.subscription_amount)
            .sum();
        if total_investment <= 0.0 {
            return Err(CapTableError::ZeroTotalInvestment);
        }

        log::info!(
            "allocating initial ownership across {} holdings from {:.2} invested",
            equity_count,
            total_investment
        );
        for holding in holdings.iter_mut().filter(|h| h.security.is_equity()) {
            holding.ownership_percentage = Some(holding.subscription_amount / total_investment);
        }
        return Ok(());
    }

    let sum = ownership_sum(holdings);
    if sum <= 0.0 {
        return Err(CapTableError::ZeroTotalInvestment);
    }
    if (sum - 1.0).abs() > tolerance {
        log::warn!("ownership sums to {:.9}; normalizing to 1", sum);
        scale_ownership(holdings, 1.0 / sum);
    }
    Ok(())
}

pub(crate) fn scale_ownership(holdings: &mut [Holding], factor: f64) {
    for holding in holdings.iter_mut() {
        if let Some(own) = holding.ownership_percentage.as_mut() {
            *own *= factor;
        }
    }
}
