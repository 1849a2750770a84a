//! Error taxonomy for the cap table engine

use thiserror::Error;

/// Errors surfaced by engine operations and input loaders
#[derive(Debug, Error)]
pub enum CapTableError {
    /// Round parameters rejected before any state changes
    #[error("invalid round '{round}': {reason}")]
    InvalidRound { round: String, reason: String },

    /// A holding carries a numeric field outside its allowed range
    #[error("invalid holding '{id}': {reason}")]
    InvalidHolding { id: String, reason: String },

    /// Holdings that cannot be interpreted together (mixed allocation, missing variant data)
    #[error("inconsistent holding '{id}': {reason}")]
    InconsistentHolding { id: String, reason: String },

    #[error("holding '{id}' is not a convertible note or SAFE")]
    NotConvertible { id: String },

    #[error("invalid trigger valuation {0}")]
    InvalidValuation(f64),

    #[error("invalid total token supply {0}")]
    InvalidTokenSupply(f64),

    /// Ownership cannot be derived when nothing has been invested or allocated
    #[error("total investment is zero; ownership fractions are undefined")]
    ZeroTotalInvestment,

    #[error("duplicate holding id '{0}'")]
    DuplicateHoldingId(String),

    #[error("unknown scenario {0}")]
    UnknownScenario(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CapTableError {
    pub(crate) fn invalid_round(round: &str, reason: impl Into<String>) -> Self {
        CapTableError::InvalidRound {
            round: round.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_holding(id: &str, reason: impl Into<String>) -> Self {
        CapTableError::InvalidHolding {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn inconsistent(id: &str, reason: impl Into<String>) -> Self {
        CapTableError::InconsistentHolding {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CapTableError>;
