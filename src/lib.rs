//! Cap Table Engine - dilution and exit waterfall modeling for private companies
//!
//! This library provides:
//! - A tagged holding model (common, preferred, convertible notes, SAFEs, tokens)
//! - Conversion of notes and SAFEs at financing rounds and at exit
//! - Single-round dilution with conversions and new issuance
//! - Named what-if scenarios folded over ordered rounds
//! - Liquidation preference / participation / common exit waterfalls

pub mod error;
pub mod config;
pub mod holding;
pub mod conversion;
pub mod round;
pub mod scenario;
pub mod waterfall;
pub mod input;

// Re-export commonly used types
pub use error::{CapTableError, Result};
pub use config::EngineConfig;
pub use holding::{Holding, Security, SecurityKind};
pub use conversion::{resolve_conversion, ConversionDecision, ConversionResolver};
pub use round::{simulate_round, CapTable, Round, RoundResult, RoundSimulator};
pub use scenario::{FinalCapTable, Scenario, ScenarioEngine, ScenarioId};
pub use waterfall::{compute_waterfall, DistributionReport, HoldingDistribution, WaterfallDistributor};
pub use input::ScenarioFile;
