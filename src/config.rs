//! Engine-wide configuration

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Tolerance used when checking that ownership fractions sum to one
pub const DEFAULT_OWNERSHIP_TOLERANCE: f64 = 1e-9;

/// Days per year for linear interest accrual on notes
pub const DEFAULT_DAY_COUNT_BASIS: f64 = 365.25;

/// Notional share count when a baseline does not specify one
pub const DEFAULT_TOTAL_SHARES: f64 = 10_000_000.0;

/// Configuration shared by the resolver, simulator and distributor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Allowed drift of the ownership sum from 1.0
    pub ownership_tolerance: f64,

    /// Date at which note interest stops accruing.
    /// None falls back to each note's maturity date.
    pub valuation_date: Option<NaiveDate>,

    /// Day count divisor for years elapsed
    pub day_count_basis: f64,

    /// Share count used for per-share reporting when none is given
    pub default_total_shares: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ownership_tolerance: DEFAULT_OWNERSHIP_TOLERANCE,
            valuation_date: None,
            day_count_basis: DEFAULT_DAY_COUNT_BASIS,
            default_total_shares: DEFAULT_TOTAL_SHARES,
        }
    }
}

impl EngineConfig {
    /// Set the interest valuation date
    pub fn as_of(mut self, date: NaiveDate) -> Self {
        self.valuation_date = Some(date);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"valuation_date": "2025-06-30"}"#).unwrap();

        assert_eq!(config.valuation_date, NaiveDate::from_ymd_opt(2025, 6, 30));
        assert_eq!(config.day_count_basis, DEFAULT_DAY_COUNT_BASIS);
        assert_eq!(config.ownership_tolerance, DEFAULT_OWNERSHIP_TOLERANCE);
    }
}
