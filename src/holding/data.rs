//! Holding and security definitions

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CapTableError, Result};

/// Default liquidation preference multiple (1x)
fn default_liquidation_multiple() -> f64 {
    1.0
}

/// Discriminant of a security, without its terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityKind {
    Common,
    Preferred,
    ConvertibleNote,
    Safe,
    Token,
}

impl SecurityKind {
    /// Label used in rosters and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityKind::Common => "common",
            SecurityKind::Preferred => "preferred",
            SecurityKind::ConvertibleNote => "convertible_note",
            SecurityKind::Safe => "safe",
            SecurityKind::Token => "token",
        }
    }
}

/// Security held by an investor, with the terms that apply to that variant only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Security {
    /// Common equity
    Common,

    /// Preferred equity with a liquidation preference
    Preferred {
        /// Multiple of subscription paid ahead of common
        #[serde(default = "default_liquidation_multiple")]
        liquidation_preference_multiple: f64,
        /// Cap on participation, as a multiple of subscription.
        /// None means non-participating.
        #[serde(default)]
        participation_multiple: Option<f64>,
    },

    /// Interest-bearing convertible debt
    ConvertibleNote {
        #[serde(default)]
        conversion_cap: Option<f64>,
        /// Discount in percent (20.0 = 20%)
        #[serde(default)]
        conversion_discount: Option<f64>,
        /// Simple annual interest rate (0.05 = 5%)
        #[serde(default)]
        interest_rate: Option<f64>,
        #[serde(default)]
        investment_date: Option<NaiveDate>,
        #[serde(default)]
        maturity_date: Option<NaiveDate>,
    },

    /// Simple agreement for future equity
    Safe {
        #[serde(default)]
        conversion_cap: Option<f64>,
        /// Discount in percent (20.0 = 20%)
        #[serde(default)]
        conversion_discount: Option<f64>,
    },

    /// Token allocation, valued against total token supply
    Token {
        /// Units allocated
        token_allocation: f64,
    },
}

impl Security {
    /// Plain 1x non-participating preferred
    pub fn preferred() -> Self {
        Security::Preferred {
            liquidation_preference_multiple: 1.0,
            participation_multiple: None,
        }
    }

    pub fn kind(&self) -> SecurityKind {
        match self {
            Security::Common => SecurityKind::Common,
            Security::Preferred { .. } => SecurityKind::Preferred,
            Security::ConvertibleNote { .. } => SecurityKind::ConvertibleNote,
            Security::Safe { .. } => SecurityKind::Safe,
            Security::Token { .. } => SecurityKind::Token,
        }
    }

    /// Notes and SAFEs
    pub fn is_convertible(&self) -> bool {
        matches!(self, Security::ConvertibleNote { .. } | Security::Safe { .. })
    }

    /// Common or preferred; the classes that carry ownership
    pub fn is_equity(&self) -> bool {
        matches!(self, Security::Common | Security::Preferred { .. })
    }

    /// Cap and discount of a convertible, if any
    pub fn conversion_terms(&self) -> Option<(Option<f64>, Option<f64>)> {
        match self {
            Security::ConvertibleNote {
                conversion_cap,
                conversion_discount,
                ..
            }
            | Security::Safe {
                conversion_cap,
                conversion_discount,
            } => Some((*conversion_cap, *conversion_discount)),
            _ => None,
        }
    }
}

/// One investor's stake at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Identifier, unique within a scenario
    pub id: String,

    /// Display name of the holder
    #[serde(default)]
    pub holder: String,

    pub security: Security,

    /// Capital contributed
    pub subscription_amount: f64,

    /// Fraction of fully diluted equity (0.25 = 25%).
    /// None until an initial allocation or round assigns it.
    #[serde(default)]
    pub ownership_percentage: Option<f64>,

    /// Original variant of a hybrid that converted during a financing round
    #[serde(default)]
    pub converted_from: Option<SecurityKind>,
}

impl Holding {
    pub fn new(id: impl Into<String>, security: Security, subscription_amount: f64) -> Self {
        let id = id.into();
        Self {
            holder: id.clone(),
            id,
            security,
            subscription_amount,
            ownership_percentage: None,
            converted_from: None,
        }
    }

    pub fn common(id: impl Into<String>, subscription_amount: f64, ownership: f64) -> Self {
        Self::new(id, Security::Common, subscription_amount).with_ownership(ownership)
    }

    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    pub fn with_ownership(mut self, ownership: f64) -> Self {
        self.ownership_percentage = Some(ownership);
        self
    }

    pub fn kind(&self) -> SecurityKind {
        self.security.kind()
    }

    /// Whether this holding converted during a financing round
    pub fn converted(&self) -> bool {
        self.converted_from.is_some()
    }

    pub fn is_token(&self) -> bool {
        matches!(self.security, Security::Token { .. })
    }

    /// Ownership, treating an unallocated holding as zero
    pub fn ownership(&self) -> f64 {
        self.ownership_percentage.unwrap_or(0.0)
    }

    /// Check numeric fields against the ranges their variant allows
    pub fn validate(&self) -> Result<()> {
        let bad = |reason: String| Err(CapTableError::invalid_holding(&self.id, reason));

        if self.id.is_empty() {
            return Err(CapTableError::inconsistent("", "holding id is empty"));
        }
        if !self.subscription_amount.is_finite() || self.subscription_amount < 0.0 {
            return bad(format!("subscription amount {} must be non-negative", self.subscription_amount));
        }
        if let Some(own) = self.ownership_percentage {
            if !own.is_finite() || !(0.0..=1.0).contains(&own) {
                return bad(format!("ownership {} outside [0, 1]", own));
            }
            if self.is_token() {
                return Err(CapTableError::inconsistent(
                    &self.id,
                    "token allocations do not carry equity ownership",
                ));
            }
            // Ownership only exists once a hybrid has converted
            if self.security.is_convertible() {
                return Err(CapTableError::inconsistent(
                    &self.id,
                    "unconverted note or SAFE carries ownership",
                ));
            }
        }

        match &self.security {
            Security::Common => {}
            Security::Preferred {
                liquidation_preference_multiple,
                participation_multiple,
            } => {
                if !liquidation_preference_multiple.is_finite() || *liquidation_preference_multiple < 0.0 {
                    return bad(format!(
                        "liquidation preference multiple {} must be non-negative",
                        liquidation_preference_multiple
                    ));
                }
                if let Some(cap) = participation_multiple {
                    if !cap.is_finite() || *cap < 0.0 {
                        return bad(format!("participation multiple {} must be non-negative", cap));
                    }
                }
            }
            Security::ConvertibleNote {
                conversion_cap,
                conversion_discount,
                interest_rate,
                ..
            } => {
                validate_conversion_terms(&self.id, *conversion_cap, *conversion_discount)?;
                if let Some(rate) = interest_rate {
                    if !rate.is_finite() || *rate < 0.0 {
                        return bad(format!("interest rate {} must be non-negative", rate));
                    }
                }
            }
            Security::Safe {
                conversion_cap,
                conversion_discount,
            } => validate_conversion_terms(&self.id, *conversion_cap, *conversion_discount)?,
            Security::Token { token_allocation } => {
                if !token_allocation.is_finite() || *token_allocation < 0.0 {
                    return bad(format!("token allocation {} must be non-negative", token_allocation));
                }
            }
        }

        Ok(())
    }
}

fn validate_conversion_terms(id: &str, cap: Option<f64>, discount: Option<f64>) -> Result<()> {
    if let Some(cap) = cap {
        if !cap.is_finite() || cap <= 0.0 {
            return Err(CapTableError::invalid_holding(id, format!("conversion cap {} must be positive", cap)));
        }
    }
    if let Some(discount) = discount {
        // 100% discount would make the effective valuation zero
        if !discount.is_finite() || !(0.0..100.0).contains(&discount) {
            return Err(CapTableError::invalid_holding(
                id,
                format!("conversion discount {}% outside [0, 100)", discount),
            ));
        }
    }
    Ok(())
}

/// Validate every holding and reject repeated ids
pub fn validate_holdings(holdings: &[Holding]) -> Result<()> {
    let mut seen = std::collections::HashSet::with_capacity(holdings.len());
    for holding in holdings {
        holding.validate()?;
        if !seen.insert(holding.id.as_str()) {
            return Err(CapTableError::DuplicateHoldingId(holding.id.clone()));
        }
    }
    Ok(())
}
