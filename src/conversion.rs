//! Conversion of convertible notes and SAFEs into equity
//!
//! A hybrid instrument either stays as debt/SAFE and is paid a fixed
//! preference amount, or converts into an ownership fraction priced at its
//! effective valuation:
//!
//! ```text
//! effective = min(cap ?? V, V * (1 - discount / 100))
//! fraction  = subscription / effective
//! ```
//!
//! At a financing round a holding converts only when a cap is present and the
//! pre-money valuation has reached it. At exit it converts when the converted
//! value beats its preference amount. Each holding decides on its own.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{CapTableError, Result};
use crate::holding::{Holding, Security};

/// Outcome of evaluating one hybrid holding against a trigger valuation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ConversionDecision {
    /// Converts into equity
    Convert {
        /// Ownership fraction before any round-level rescaling
        ownership_fraction: f64,
        /// Valuation the conversion is priced at
        effective_valuation: f64,
    },
    /// Stays as a note/SAFE and is owed a fixed amount
    Hold {
        /// Subscription plus accrued interest
        preference_amount: f64,
        accrued_interest: f64,
    },
}

impl ConversionDecision {
    pub fn converts(&self) -> bool {
        matches!(self, ConversionDecision::Convert { .. })
    }

    /// Ownership fraction if converting, zero otherwise
    pub fn ownership_fraction(&self) -> f64 {
        match self {
            ConversionDecision::Convert { ownership_fraction, .. } => *ownership_fraction,
            ConversionDecision::Hold { .. } => 0.0,
        }
    }

    /// Preference owed if holding, zero otherwise
    pub fn preference_amount(&self) -> f64 {
        match self {
            ConversionDecision::Convert { .. } => 0.0,
            ConversionDecision::Hold { preference_amount, .. } => *preference_amount,
        }
    }
}

/// Evaluates hybrid instruments at financing rounds and at exit
#[derive(Debug, Clone, Default)]
pub struct ConversionResolver {
    config: EngineConfig,
}

impl ConversionResolver {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Decide whether `holding` converts at `trigger_valuation`.
    ///
    /// `at_exit` selects the exit-time rule (convert when more valuable)
    /// over the round-time rule (convert when the cap has been reached).
    pub fn resolve(&self, holding: &Holding, trigger_valuation: f64, at_exit: bool) -> Result<ConversionDecision> {
        let (cap, discount) = holding
            .security
            .conversion_terms()
            .ok_or_else(|| CapTableError::NotConvertible { id: holding.id.clone() })?;

        if !trigger_valuation.is_finite() || trigger_valuation <= 0.0 {
            return Err(CapTableError::InvalidValuation(trigger_valuation));
        }

        let effective_valuation = effective_valuation(cap, discount, trigger_valuation);
        let ownership_fraction = holding.subscription_amount / effective_valuation;
        let accrued_interest = self.accrued_interest(holding);
        let preference_amount = holding.subscription_amount + accrued_interest;

        let converts = if at_exit {
            ownership_fraction * trigger_valuation > preference_amount
        } else {
            // Uncapped instruments wait for exit
            cap.map_or(false, |cap| trigger_valuation >= cap)
        };

        log::debug!(
            "conversion '{}': trigger={:.2} effective={:.2} fraction={:.6} preference={:.2} at_exit={} converts={}",
            holding.id,
            trigger_valuation,
            effective_valuation,
            ownership_fraction,
            preference_amount,
            at_exit,
            converts
        );

        Ok(if converts {
            ConversionDecision::Convert {
                ownership_fraction,
                effective_valuation,
            }
        } else {
            ConversionDecision::Hold {
                preference_amount,
                accrued_interest,
            }
        })
    }

    /// Simple interest on a note, capped at one year of accrual.
    /// SAFEs and notes without a rate or dates accrue nothing.
    pub fn accrued_interest(&self, holding: &Holding) -> f64 {
        match &holding.security {
            Security::ConvertibleNote {
                interest_rate: Some(rate),
                investment_date,
                maturity_date,
                ..
            } => {
                let years = years_elapsed(
                    *investment_date,
                    self.config.valuation_date.or(*maturity_date),
                    self.config.day_count_basis,
                );
                holding.subscription_amount * rate * years.min(1.0)
            }
            _ => 0.0,
        }
    }
}

/// Valuation a convertible prices at, given its cap and percent discount
pub fn effective_valuation(cap: Option<f64>, discount: Option<f64>, trigger_valuation: f64) -> f64 {
    let capped = cap.unwrap_or(trigger_valuation);
    let discounted = trigger_valuation * (1.0 - discount.unwrap_or(0.0) / 100.0);
    capped.min(discounted)
}

fn years_elapsed(from: Option<NaiveDate>, to: Option<NaiveDate>, basis: f64) -> f64 {
    match (from, to) {
        (Some(from), Some(to)) if basis > 0.0 => ((to - from).num_days() as f64 / basis).max(0.0),
        _ => 0.0,
    }
}

/// Resolve with default configuration
pub fn resolve_conversion(holding: &Holding, trigger_valuation: f64, at_exit: bool) -> Result<ConversionDecision> {
    ConversionResolver::default().resolve(holding, trigger_valuation, at_exit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn safe(cap: Option<f64>, discount: Option<f64>, amount: f64) -> Holding {
        Holding::new(
            "safe",
            Security::Safe {
                conversion_cap: cap,
                conversion_discount: discount,
            },
            amount,
        )
    }

    fn note(rate: f64, from: &str, to: &str) -> Holding {
        Holding::new(
            "note",
            Security::ConvertibleNote {
                conversion_cap: Some(5_000_000.0),
                conversion_discount: None,
                interest_rate: Some(rate),
                investment_date: from.parse().ok(),
                maturity_date: to.parse().ok(),
            },
            100_000.0,
        )
    }

    #[test]
    fn test_effective_valuation_cap_binds() {
        // Cap 8M vs 20% off 12M = 9.6M
        assert_relative_eq!(effective_valuation(Some(8e6), Some(20.0), 12e6), 8e6);
    }

    #[test]
    fn test_effective_valuation_discount_binds() {
        // Cap 12M vs 20% off 10M = 8M
        assert_relative_eq!(effective_valuation(Some(12e6), Some(20.0), 10e6), 8e6);
    }

    #[test]
    fn test_effective_valuation_no_terms() {
        assert_relative_eq!(effective_valuation(None, None, 7e6), 7e6);
    }

    #[test]
    fn test_round_converts_at_or_above_cap() {
        let holding = safe(Some(10e6), None, 500_000.0);

        let at_cap = resolve_conversion(&holding, 10e6, false).unwrap();
        assert!(at_cap.converts());
        assert_relative_eq!(at_cap.ownership_fraction(), 0.05);

        let below = resolve_conversion(&holding, 9e6, false).unwrap();
        assert!(!below.converts());
        assert_relative_eq!(below.preference_amount(), 500_000.0);
    }

    #[test]
    fn test_uncapped_never_converts_at_round() {
        let holding = safe(None, Some(20.0), 500_000.0);
        let decision = resolve_conversion(&holding, 100e6, false).unwrap();
        assert!(!decision.converts());
    }

    #[test]
    fn test_exit_converts_when_more_valuable() {
        let holding = safe(Some(5e6), None, 500_000.0);

        // 10% of 20M = 2M > 500k
        let high = resolve_conversion(&holding, 20e6, true).unwrap();
        assert!(high.converts());
        assert_relative_eq!(high.ownership_fraction(), 0.1);

        // Exit at 4M: effective 4M, 12.5% of 4M = 500k, not strictly better
        let low = resolve_conversion(&holding, 4e6, true).unwrap();
        assert!(!low.converts());
    }

    #[test]
    fn test_discount_monotonicity() {
        let mut last = 0.0;
        for discount in [0.0, 5.0, 10.0, 20.0, 35.0, 50.0] {
            let holding = safe(Some(15e6), Some(discount), 1_000_000.0);
            let fraction = match resolve_conversion(&holding, 20e6, true).unwrap() {
                ConversionDecision::Convert { ownership_fraction, .. } => ownership_fraction,
                ConversionDecision::Hold { .. } => panic!("expected conversion"),
            };
            assert!(fraction >= last, "discount {} lowered fraction", discount);
            last = fraction;
        }
    }

    #[test]
    fn test_note_interest_capped_at_one_year() {
        let resolver = ConversionResolver::default();

        let half = note(0.08, "2024-01-01", "2024-07-02");
        let interest = resolver.accrued_interest(&half);
        assert!((interest - 100_000.0 * 0.08 * 183.0 / 365.25).abs() < 1e-6);

        let three_years = note(0.08, "2021-01-01", "2024-01-01");
        assert_relative_eq!(resolver.accrued_interest(&three_years), 8_000.0);
    }

    #[test]
    fn test_valuation_date_overrides_maturity() {
        let config = EngineConfig::default().as_of("2024-01-01".parse().unwrap());
        let resolver = ConversionResolver::new(config);
        let holding = note(0.10, "2024-01-01", "2026-01-01");

        assert_eq!(resolver.accrued_interest(&holding), 0.0);
    }

    #[test]
    fn test_interest_goes_to_preference_only() {
        let holding = note(0.10, "2022-01-01", "2024-01-01");
        match resolve_conversion(&holding, 1e6, true).unwrap() {
            ConversionDecision::Hold {
                preference_amount,
                accrued_interest,
            } => {
                assert_relative_eq!(accrued_interest, 10_000.0);
                assert_relative_eq!(preference_amount, 110_000.0);
            }
            other => panic!("unexpected {:?}", other),
        }

        // Converted fraction is subscription over effective, no interest
        let converted = resolve_conversion(&holding, 50e6, true).unwrap();
        assert_relative_eq!(converted.ownership_fraction(), 100_000.0 / 5e6);
    }

    #[test]
    fn test_rejects_non_convertible_and_bad_valuation() {
        let common = Holding::common("c", 0.0, 1.0);
        assert!(matches!(
            resolve_conversion(&common, 1e6, false),
            Err(CapTableError::NotConvertible { .. })
        ));

        let holding = safe(None, None, 1.0);
        assert!(resolve_conversion(&holding, 0.0, true).is_err());
        assert!(resolve_conversion(&holding, f64::NAN, true).is_err());
    }
}
