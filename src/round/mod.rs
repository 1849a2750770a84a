//! Financing rounds and the round simulator

mod params;
mod cap_table;
mod simulator;

pub use params::Round;
pub use cap_table::CapTable;
pub use simulator::{simulate_round, RoundResult, RoundSimulator};
