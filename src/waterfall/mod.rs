//! Exit proceeds distribution

mod report;
mod distributor;
pub mod sweep;

pub use report::{DistributionReport, HoldingDistribution};
pub use distributor::{compute_waterfall, WaterfallDistributor};
pub use sweep::{breakeven_exit, exit_range, sweep_exit_values};
