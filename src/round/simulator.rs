//! Apply one financing round to a cap table

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::cap_table::{ownership_sum, prepare_ownership, scale_ownership, CapTable};
use super::params::Round;
use crate::config::EngineConfig;
use crate::conversion::{ConversionDecision, ConversionResolver};
use crate::error::{CapTableError, Result};
use crate::holding::{validate_holdings, Holding, Security};

/// Outcome of applying one round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResult {
    pub round_name: String,

    /// Pre-existing holdings after dilution, including converted hybrids
    pub diluted_holdings: Vec<Holding>,

    /// Holdings issued to the round's new investors
    pub new_holdings: Vec<Holding>,

    pub pre_money_valuation: f64,
    pub post_money_valuation: f64,

    /// Price per share paid in the round
    pub new_share_price: f64,
    pub new_total_shares: f64,

    /// Hybrids that converted in this round
    pub converted_count: usize,

    /// pre / post
    pub dilution_factor: f64,

    /// pre / (post + additional_ownership * pre), applied to existing holdings
    pub adjusted_dilution_factor: f64,

    /// Rescaling applied so ownership sums to one; 1.0 without conversions
    pub normalization_factor: f64,
}

impl RoundResult {
    /// Diluted and new holdings, in that order
    pub fn holdings(&self) -> Vec<Holding> {
        self.diluted_holdings
            .iter()
            .chain(self.new_holdings.iter())
            .cloned()
            .collect()
    }

    /// Post-round cap table, for feeding into the next round
    pub fn into_cap_table(self) -> CapTable {
        let mut holdings = self.diluted_holdings;
        holdings.extend(self.new_holdings);
        CapTable {
            holdings,
            valuation: self.post_money_valuation,
            total_shares: Some(self.new_total_shares),
        }
    }

    pub fn ownership_sum(&self) -> f64 {
        ownership_sum(&self.diluted_holdings) + ownership_sum(&self.new_holdings)
    }
}

/// A hybrid holding that converts in the current round
struct Conversion {
    index: usize,
    ownership_fraction: f64,
    effective_valuation: f64,
}

/// Applies financing rounds to cap tables
#[derive(Debug, Clone, Default)]
pub struct RoundSimulator {
    config: EngineConfig,
    resolver: ConversionResolver,
}

impl RoundSimulator {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            resolver: ConversionResolver::new(config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply `round` to `cap_table`, returning the diluted and new holdings.
    ///
    /// The adjusted dilution factor treats the conversions' combined
    /// ownership as if it were independent of valuation. This is a known
    /// approximation, kept as-is; the final normalization pass absorbs the
    /// drift it causes.
    pub fn simulate(&self, cap_table: &CapTable, round: &Round) -> Result<RoundResult> {
        round.validate()?;
        validate_holdings(&cap_table.holdings)?;
        let total_shares = cap_table.total_shares.unwrap_or(self.config.default_total_shares);
        if !total_shares.is_finite() || total_shares <= 0.0 {
            return Err(CapTableError::invalid_round(
                &round.name,
                format!("total shares {} must be positive", total_shares),
            ));
        }

        let mut holdings = cap_table.holdings.clone();
        prepare_ownership(&mut holdings, self.config.ownership_tolerance)?;

        let pre_money = round.pre_money_valuation;

        // Step 1: capped hybrids whose cap the pre-money has reached
        let mut conversions = Vec::new();
        for (index, holding) in holdings.iter().enumerate() {
            if !holding.security.is_convertible() {
                continue;
            }
            if let ConversionDecision::Convert {
                ownership_fraction,
                effective_valuation,
            } = self.resolver.resolve(holding, pre_money, false)?
            {
                conversions.push(Conversion {
                    index,
                    ownership_fraction,
                    effective_valuation,
                });
            }
        }

        // Steps 2-3
        let post_money = round.post_money_valuation();
        let dilution_factor = pre_money / post_money;
        let additional_ownership: f64 = conversions.iter().map(|c| c.ownership_fraction).sum();
        let adjusted_dilution_factor = pre_money / (post_money + additional_ownership * pre_money);

        log::debug!(
            "round '{}': post={:.2} dilution={:.6} adjusted={:.6} conversions={} additional={:.6}",
            round.name,
            post_money,
            dilution_factor,
            adjusted_dilution_factor,
            conversions.len(),
            additional_ownership
        );

        for holding in holdings.iter_mut() {
            if !holding.security.is_convertible() {
                if let Some(own) = holding.ownership_percentage.as_mut() {
                    *own *= adjusted_dilution_factor;
                }
            }
        }

        // Step 4: converted hybrids become common on the post-round scale
        for conversion in &conversions {
            let holding = &mut holdings[conversion.index];
            holding.converted_from = Some(holding.kind());
            holding.security = Security::Common;
            holding.ownership_percentage = Some(conversion.ownership_fraction * adjusted_dilution_factor);
        }

        // Step 5
        let mut new_holdings = self.issue_new_holdings(round, &holdings, post_money);

        let sum = ownership_sum(&holdings) + ownership_sum(&new_holdings);
        let normalization_factor = if (sum - 1.0).abs() > self.config.ownership_tolerance {
            1.0 / sum
        } else {
            1.0
        };
        if normalization_factor != 1.0 {
            log::debug!("round '{}': ownership summed to {:.9}, rescaling", round.name, sum);
            scale_ownership(&mut holdings, normalization_factor);
            scale_ownership(&mut new_holdings, normalization_factor);
        }

        // Step 6: share counts at the round's implied price
        let share_price = pre_money / total_shares;
        let additional_shares: f64 = conversions
            .iter()
            .map(|c| holdings[c.index].subscription_amount / (c.effective_valuation / total_shares))
            .sum();
        let new_total_shares = total_shares + additional_shares + round.amount / share_price;

        log::info!(
            "round '{}': pre={:.2} raised={:.2} post={:.2} price={:.4} converted={} new holdings={}",
            round.name,
            pre_money,
            round.amount,
            post_money,
            share_price,
            conversions.len(),
            new_holdings.len()
        );

        Ok(RoundResult {
            round_name: round.name.clone(),
            diluted_holdings: holdings,
            new_holdings,
            pre_money_valuation: pre_money,
            post_money_valuation: post_money,
            new_share_price: share_price,
            new_total_shares,
            converted_count: conversions.len(),
            dilution_factor,
            adjusted_dilution_factor,
            normalization_factor,
        })
    }

    fn issue_new_holdings(&self, round: &Round, existing: &[Holding], post_money: f64) -> Vec<Holding> {
        let count = round.new_investor_count;
        let ownership_each = (round.amount / post_money) / count as f64;
        let subscription_each = round.amount / count as f64;

        let mut taken: HashSet<String> = existing.iter().map(|h| h.id.clone()).collect();
        let slug = round.slug();

        (1..=count)
            .map(|n| {
                let id = unique_id(&format!("{}-investor-{}", slug, n), &mut taken);
                Holding {
                    id,
                    holder: format!("{} Investor {}", round.name, n),
                    security: round.issued_security.clone(),
                    subscription_amount: subscription_each,
                    ownership_percentage: Some(ownership_each),
                    converted_from: None,
                }
            })
            .collect()
    }
}

/// `base`, or `base-2`, `base-3`... if already taken
fn unique_id(base: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut suffix = 2;
    while taken.contains(&candidate) {
        candidate = format!("{}-{}", base, suffix);
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Simulate with default configuration
pub fn simulate_round(cap_table: &CapTable, round: &Round) -> Result<RoundResult> {
    RoundSimulator::default().simulate(cap_table, round)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holding::SecurityKind;
    use approx::assert_relative_eq;

    fn founder_only() -> CapTable {
        CapTable::new(vec![Holding::common("founder", 0.0, 1.0)], 5_000_000.0)
    }

    #[test]
    fn test_series_a_example() {
        let round = Round::new("Series A", 10_000_000.0, 5_000_000.0, 3).unwrap();
        let result = simulate_round(&founder_only(), &round).unwrap();

        assert_relative_eq!(result.post_money_valuation, 15_000_000.0);
        assert_relative_eq!(result.dilution_factor, 10.0 / 15.0);
        assert_relative_eq!(result.diluted_holdings[0].ownership(), 2.0 / 3.0, epsilon = 1e-12);

        assert_eq!(result.new_holdings.len(), 3);
        for holding in &result.new_holdings {
            assert!((holding.ownership() - 1.0 / 9.0).abs() < 1e-12);
            assert_relative_eq!(holding.subscription_amount, 5_000_000.0 / 3.0);
            assert_eq!(holding.security, Security::preferred());
        }
        assert_eq!(result.new_holdings[0].id, "series-a-investor-1");

        assert_eq!(result.converted_count, 0);
        assert_eq!(result.normalization_factor, 1.0);
        assert!((result.ownership_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_share_count_without_conversions() {
        let table = founder_only().with_total_shares(1_000_000.0);
        let round = Round::new("Seed", 4_000_000.0, 1_000_000.0, 1).unwrap();
        let result = simulate_round(&table, &round).unwrap();

        assert_relative_eq!(result.new_share_price, 4.0);
        assert_relative_eq!(result.new_total_shares, 1_250_000.0);
    }

    #[test]
    fn test_configured_share_count_used_when_absent() {
        let config = EngineConfig {
            default_total_shares: 2_000_000.0,
            ..EngineConfig::default()
        };
        let round = Round::new("Seed", 4_000_000.0, 1_000_000.0, 1).unwrap();
        let result = RoundSimulator::new(config).simulate(&founder_only(), &round).unwrap();

        assert_relative_eq!(result.new_share_price, 2.0);
        assert_relative_eq!(result.new_total_shares, 2_500_000.0);
        assert_eq!(result.into_cap_table().total_shares, Some(2_500_000.0));
    }

    #[test]
    fn test_capped_safe_converts_and_table_normalizes() {
        let safe = Holding::new(
            "safe",
            Security::Safe {
                conversion_cap: Some(8_000_000.0),
                conversion_discount: None,
            },
            500_000.0,
        );
        let table = CapTable::new(vec![Holding::common("founder", 0.0, 1.0), safe], 8_000_000.0);
        let round = Round::new("Series A", 10_000_000.0, 2_000_000.0, 1).unwrap();

        let result = simulate_round(&table, &round).unwrap();

        // Known approximation: 10 / (12 + 0.0625 * 10)
        assert_relative_eq!(result.adjusted_dilution_factor, 10.0 / 12.625);
        assert_eq!(result.converted_count, 1);
        assert!(result.normalization_factor < 1.0);
        assert!((result.ownership_sum() - 1.0).abs() < 1e-9);

        let converted = &result.diluted_holdings[1];
        assert_eq!(converted.security, Security::Common);
        assert_eq!(converted.converted_from, Some(SecurityKind::Safe));
        assert!(converted.converted());

        // Relative sizes follow the formula before normalization
        let founder = result.diluted_holdings[0].ownership();
        assert_relative_eq!(converted.ownership() / founder, 0.0625, epsilon = 1e-12);

        // 10M shares at $1: 625k conversion shares, 2M new shares
        assert_relative_eq!(result.new_share_price, 1.0);
        assert_relative_eq!(result.new_total_shares, 12_625_000.0);
    }

    #[test]
    fn test_cap_above_pre_money_does_not_convert() {
        let note = Holding::new(
            "note",
            Security::ConvertibleNote {
                conversion_cap: Some(20_000_000.0),
                conversion_discount: Some(20.0),
                interest_rate: Some(0.05),
                investment_date: None,
                maturity_date: None,
            },
            250_000.0,
        );
        let uncapped = Holding::new(
            "safe",
            Security::Safe {
                conversion_cap: None,
                conversion_discount: Some(15.0),
            },
            100_000.0,
        );
        let table = CapTable::new(vec![Holding::common("founder", 0.0, 1.0), note.clone(), uncapped.clone()], 1.0);
        let round = Round::new("Seed", 6_000_000.0, 1_500_000.0, 2).unwrap();

        let result = simulate_round(&table, &round).unwrap();
        assert_eq!(result.converted_count, 0);
        assert_eq!(result.diluted_holdings[1], note);
        assert_eq!(result.diluted_holdings[2], uncapped);
        assert!((result.ownership_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tokens_keep_no_ownership() {
        let table = CapTable::new(
            vec![
                Holding::common("founder", 0.0, 1.0),
                Holding::new("tok", Security::Token { token_allocation: 1_000.0 }, 0.0),
            ],
            1.0,
        );
        let round = Round::new("Seed", 4_000_000.0, 1_000_000.0, 1).unwrap();
        let result = simulate_round(&table, &round).unwrap();

        assert_eq!(result.diluted_holdings[1].ownership_percentage, None);
        assert!((result.ownership_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_total_investment_is_error() {
        let table = CapTable::new(vec![Holding::new("founder", Security::Common, 0.0)], 1.0);
        let round = Round::new("Seed", 1_000_000.0, 100_000.0, 1).unwrap();

        assert!(matches!(
            simulate_round(&table, &round),
            Err(CapTableError::ZeroTotalInvestment)
        ));
    }

    #[test]
    fn test_unconverted_safe_with_ownership_rejected() {
        let safe = Holding::new(
            "safe",
            Security::Safe {
                conversion_cap: Some(50_000_000.0),
                conversion_discount: None,
            },
            500_000.0,
        )
        .with_ownership(0.1);
        let table = CapTable::new(vec![Holding::common("founder", 0.0, 0.9), safe], 1.0);
        let round = Round::new("Series A", 10_000_000.0, 5_000_000.0, 1).unwrap();

        assert!(matches!(
            simulate_round(&table, &round),
            Err(CapTableError::InconsistentHolding { id, .. }) if id == "safe"
        ));
    }

    #[test]
    fn test_new_investor_gets_amount_over_post_with_pending_safe() {
        let safe = Holding::new(
            "safe",
            Security::Safe {
                conversion_cap: Some(50_000_000.0),
                conversion_discount: None,
            },
            500_000.0,
        );
        let table = CapTable::new(vec![Holding::common("founder", 0.0, 1.0), safe], 1.0);
        let round = Round::new("Series A", 10_000_000.0, 5_000_000.0, 1).unwrap();

        let result = simulate_round(&table, &round).unwrap();
        assert_eq!(result.normalization_factor, 1.0);
        assert!((result.new_holdings[0].ownership() - 1.0 / 3.0).abs() < 1e-12);
        assert!((result.diluted_holdings[0].ownership() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(result.diluted_holdings[1].ownership_percentage, None);
    }

    #[test]
    fn test_invalid_round_rejected_before_work() {
        let mut round = Round::new("Seed", 1_000_000.0, 100_000.0, 1).unwrap();
        round.amount = 0.0;

        assert!(matches!(
            simulate_round(&founder_only(), &round),
            Err(CapTableError::InvalidRound { .. })
        ));
    }

    #[test]
    fn test_generated_ids_stay_unique() {
        let round = Round::new("Bridge", 1_000_000.0, 100_000.0, 1).unwrap();
        let first = simulate_round(&founder_only(), &round).unwrap().into_cap_table();
        let second = simulate_round(&first, &round).unwrap();

        assert_eq!(second.new_holdings[0].id, "bridge-investor-1-2");
        assert!(validate_holdings(&second.holdings()).is_ok());
    }

    #[test]
    fn test_non_ascii_round_name_gets_readable_ids() {
        let round = Round::new("Δ", 1_000_000.0, 100_000.0, 2).unwrap();
        let result = simulate_round(&founder_only(), &round).unwrap();

        assert_eq!(result.new_holdings[0].id, "round-investor-1");
        assert_eq!(result.new_holdings[1].id, "round-investor-2");
    }
}
