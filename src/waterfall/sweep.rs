//! Waterfalls over a range of hypothetical exit values

use rayon::prelude::*;

use super::distributor::WaterfallDistributor;
use super::report::DistributionReport;
use crate::error::Result;
use crate::holding::{Holding, SecurityKind};

/// One report per exit value, in input order
pub fn sweep_exit_values(
    distributor: &WaterfallDistributor,
    holdings: &[Holding],
    exit_values: &[f64],
    total_token_supply: f64,
) -> Result<Vec<DistributionReport>> {
    exit_values
        .par_iter()
        .map(|&exit| distributor.distribute(holdings, exit, total_token_supply))
        .collect()
}

/// `steps` evenly spaced exit values from `from` to `to`, inclusive
pub fn exit_range(from: f64, to: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![from],
        _ => {
            let step = (to - from) / (steps - 1) as f64;
            (0..steps).map(|i| from + step * i as f64).collect()
        }
    }
}

/// Smallest swept exit at which every invested preferred, note and SAFE
/// holding gets at least its money back
pub fn breakeven_exit(reports: &[DistributionReport]) -> Option<f64> {
    reports
        .iter()
        .filter(|report| {
            report
                .rows
                .iter()
                .filter(|row| {
                    matches!(
                        row.security,
                        SecurityKind::Preferred | SecurityKind::ConvertibleNote | SecurityKind::Safe
                    ) && row.subscription_amount > 0.0
                })
                .all(|row| row.multiple.map_or(false, |m| m >= 1.0))
        })
        .map(|report| report.exit_value)
        .min_by(|a, b| a.total_cmp(b))
}
