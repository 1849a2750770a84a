//! Holding model and roster loading

mod data;
pub mod loader;

pub use data::{validate_holdings, Holding, Security, SecurityKind};
pub use loader::{load_holdings, load_holdings_from_reader};
