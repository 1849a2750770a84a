//! Financing round parameters

use serde::{Deserialize, Serialize};

use crate::error::{CapTableError, Result};
use crate::holding::Security;

/// One financing event. Validated on construction and never mutated once
/// recorded in a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub name: String,

    /// Company value before new money
    pub pre_money_valuation: f64,

    /// Capital raised in this round
    pub amount: f64,

    /// Number of new holdings to issue; the raise is split evenly
    pub new_investor_count: u32,

    /// Security issued to new investors
    #[serde(default = "Security::preferred")]
    pub issued_security: Security,
}

impl Round {
    /// Create a round issuing 1x non-participating preferred
    pub fn new(name: impl Into<String>, pre_money_valuation: f64, amount: f64, new_investor_count: u32) -> Result<Self> {
        let round = Self {
            name: name.into(),
            pre_money_valuation,
            amount,
            new_investor_count,
            issued_security: Security::preferred(),
        };
        round.validate()?;
        Ok(round)
    }

    /// Replace the issued security terms
    pub fn issuing(mut self, security: Security) -> Result<Self> {
        self.issued_security = security;
        self.validate()?;
        Ok(self)
    }

    pub fn post_money_valuation(&self) -> f64 {
        self.pre_money_valuation + self.amount
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Err(CapTableError::invalid_round(&self.name, reason));

        if self.name.trim().is_empty() {
            return fail("round name is empty".to_string());
        }
        if !self.pre_money_valuation.is_finite() || self.pre_money_valuation <= 0.0 {
            return fail(format!("pre-money valuation {} must be positive", self.pre_money_valuation));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return fail(format!("amount {} must be positive", self.amount));
        }
        if self.new_investor_count == 0 {
            return fail("at least one new investor is required".to_string());
        }
        if !self.issued_security.is_equity() {
            return fail(format!(
                "rounds issue common or preferred equity, not {}",
                self.issued_security.kind().as_str()
            ));
        }
        if let Security::Preferred {
            liquidation_preference_multiple,
            participation_multiple,
        } = &self.issued_security
        {
            let cap_ok = participation_multiple.map_or(true, |cap| cap.is_finite() && cap >= 0.0);
            if !liquidation_preference_multiple.is_finite() || *liquidation_preference_multiple < 0.0 || !cap_ok {
                return fail("preferred terms must be non-negative".to_string());
            }
        }
        Ok(())
    }

    /// Lowercase, dash-separated form of the name used for generated ids
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.name.len());
        for c in self.name.trim().chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_matches('-');
        if slug.is_empty() {
            "round".to_string()
        } else {
            slug.to_string()
        }
    }
}
