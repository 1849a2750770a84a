//! Exit waterfall: preferences, then participation, then common
//!
//! Each layer draws from what the previous layers left. A layer whose claims
//! exceed the value available is cut back pro rata by a single scalar.
//! Token allocations sit outside the waterfall and are valued directly
//! against total token supply.

use crate::config::EngineConfig;
use crate::conversion::{ConversionDecision, ConversionResolver};
use crate::error::{CapTableError, Result};
use crate::holding::{validate_holdings, Holding, Security};

use super::report::{DistributionReport, HoldingDistribution};

/// Computes per-holding exit proceeds
#[derive(Debug, Clone, Default)]
pub struct WaterfallDistributor {
    resolver: ConversionResolver,
}

impl WaterfallDistributor {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            resolver: ConversionResolver::new(config),
        }
    }

    /// Distribute `exit_value` across `holdings`.
    ///
    /// Non-positive or non-finite exit values yield an all-zero report.
    pub fn distribute(&self, holdings: &[Holding], exit_value: f64, total_token_supply: f64) -> Result<DistributionReport> {
        validate_holdings(holdings)?;
        if !total_token_supply.is_finite() || total_token_supply < 0.0 {
            return Err(CapTableError::InvalidTokenSupply(total_token_supply));
        }
        if !exit_value.is_finite() || exit_value <= 0.0 {
            log::debug!("exit value {} is degenerate; returning zero distribution", exit_value);
            return Ok(DistributionReport::zero(holdings, exit_value, total_token_supply));
        }

        let mut report = DistributionReport::zero(holdings, exit_value, total_token_supply);
        // Ownership weight of holdings that convert at exit
        let mut exit_fractions: Vec<Option<f64>> = vec![None; holdings.len()];

        // Layer 1: preferences
        for (i, holding) in holdings.iter().enumerate() {
            let preference = match &holding.security {
                Security::Preferred {
                    liquidation_preference_multiple,
                    ..
                } => holding.subscription_amount * liquidation_preference_multiple,
                Security::ConvertibleNote { .. } | Security::Safe { .. } => {
                    match self.resolver.resolve(holding, exit_value, true)? {
                        ConversionDecision::Convert { ownership_fraction, .. } => {
                            exit_fractions[i] = Some(ownership_fraction);
                            report.rows[i].converted = true;
                            0.0
                        }
                        ConversionDecision::Hold { preference_amount, .. } => preference_amount,
                    }
                }
                Security::Common | Security::Token { .. } => 0.0,
            };
            report.rows[i].preference_amount = preference;
        }

        let preference_claims: f64 = report.rows.iter().map(|r| r.preference_amount).sum();
        report.preference_haircut = haircut(&mut report.rows, preference_claims, exit_value, |r| &mut r.preference_amount);
        report.preference_pool = preference_claims.min(exit_value);
        if let Some(factor) = report.preference_haircut {
            log::warn!(
                "preferences {:.2} exceed exit {:.2}; scaling by {:.6}",
                preference_claims,
                exit_value,
                factor
            );
        }
        let mut remaining = exit_value - report.preference_pool;

        // Layer 2: capped participation on pre-exit ownership
        if remaining > 0.0 {
            for (i, holding) in holdings.iter().enumerate() {
                if let Security::Preferred {
                    participation_multiple: Some(cap),
                    ..
                } = &holding.security
                {
                    let uncapped = holding.ownership() * remaining;
                    report.rows[i].participation_amount = uncapped.min(holding.subscription_amount * cap);
                }
            }
            let participation_claims: f64 = report.rows.iter().map(|r| r.participation_amount).sum();
            report.participation_haircut =
                haircut(&mut report.rows, participation_claims, remaining, |r| &mut r.participation_amount);
            report.participation_pool = participation_claims.min(remaining);
            remaining -= report.participation_pool;
        }

        // Layer 3: common and anything that converted
        if remaining > 0.0 {
            let weights: Vec<Option<f64>> = holdings
                .iter()
                .zip(&exit_fractions)
                .map(|(holding, exit_fraction)| match (&holding.security, exit_fraction) {
                    (_, Some(fraction)) => Some(*fraction),
                    (Security::Common, None) => Some(holding.ownership()),
                    _ => None,
                })
                .collect();

            if weights.iter().any(Option::is_some) {
                share_pro_rata(&mut report.rows, &weights, remaining);
                report.common_pool = remaining;
            } else {
                report.unallocated = self.distribute_residual(holdings, &mut report, remaining);
                report.common_pool = remaining - report.unallocated;
            }
        }

        // Tokens, outside the waterfall
        if total_token_supply > 0.0 {
            for (i, holding) in holdings.iter().enumerate() {
                if let Security::Token { token_allocation } = holding.security {
                    report.rows[i].token_distribution = token_allocation / total_token_supply * exit_value;
                }
            }
        }

        for (row, holding) in report.rows.iter_mut().zip(holdings) {
            row.finalize(exit_value);
            if holding.is_token() {
                report.token_pool += row.total_return;
            } else {
                report.equity_total += row.total_return;
            }
            report.total_returns += row.total_return;
        }

        log::info!(
            "waterfall at {:.2}: preferences={:.2} participation={:.2} common={:.2} tokens={:.2}",
            exit_value,
            report.preference_pool,
            report.participation_pool,
            report.common_pool,
            report.token_pool
        );

        Ok(report)
    }

    /// Residual when no holding is in the common layer. Goes to the other
    /// non-token holdings by ownership, then by subscription, then equally.
    /// Returns whatever could not be placed.
    fn distribute_residual(&self, holdings: &[Holding], report: &mut DistributionReport, residual: f64) -> f64 {
        let eligible: Vec<bool> = holdings.iter().map(|h| !h.is_token()).collect();
        if !eligible.iter().any(|&e| e) {
            log::warn!("no equity holders for residual {:.2}; left unallocated", residual);
            return residual;
        }

        let by_ownership = weights_where(holdings, &eligible, Holding::ownership);
        let weights = if by_ownership.iter().flatten().sum::<f64>() > 0.0 {
            by_ownership
        } else {
            weights_where(holdings, &eligible, |h| h.subscription_amount)
        };

        log::warn!("no common holders; residual {:.2} shared among senior holders", residual);
        share_pro_rata(&mut report.rows, &weights, residual);
        0.0
    }
}

fn weights_where(holdings: &[Holding], eligible: &[bool], weight: impl Fn(&Holding) -> f64) -> Vec<Option<f64>> {
    holdings
        .iter()
        .zip(eligible)
        .map(|(h, &e)| if e { Some(weight(h)) } else { None })
        .collect()
}

/// Split `amount` among rows with a weight, normalised against the group's
/// own total. A zero-weight group splits evenly.
fn share_pro_rata(rows: &mut [HoldingDistribution], weights: &[Option<f64>], amount: f64) {
    let members = weights.iter().flatten().count();
    if members == 0 {
        return;
    }
    let total: f64 = weights.iter().flatten().sum();

    for (row, weight) in rows.iter_mut().zip(weights) {
        if let Some(weight) = weight {
            row.common_distribution += if total > 0.0 {
                weight / total * amount
            } else {
                amount / members as f64
            };
        }
    }
}

/// Scale one layer down when its claims exceed what is available.
/// Returns the factor applied, if any.
fn haircut(
    rows: &mut [HoldingDistribution],
    claims: f64,
    available: f64,
    field: impl Fn(&mut HoldingDistribution) -> &mut f64,
) -> Option<f64> {
    if claims <= available || claims <= 0.0 {
        return None;
    }
    let factor = available / claims;
    for row in rows.iter_mut() {
        *field(row) *= factor;
    }
    Some(factor)
}

/// Distribute with default configuration
pub fn compute_waterfall(holdings: &[Holding], exit_value: f64, total_token_supply: f64) -> Result<DistributionReport> {
    WaterfallDistributor::default().distribute(holdings, exit_value, total_token_supply)
}
