//! Load a holdings roster from CSV

use super::{validate_holdings, Holding, Security};
use crate::error::{CapTableError, Result};
use chrono::NaiveDate;
use csv::Reader;
use std::path::Path;

/// Raw CSV row; variant-specific columns may be blank
#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    id: String,
    #[serde(default)]
    holder: String,
    security_type: String,
    subscription_amount: f64,
    ownership_percentage: Option<f64>,
    liquidation_preference_multiple: Option<f64>,
    participation_multiple: Option<f64>,
    conversion_cap: Option<f64>,
    conversion_discount: Option<f64>,
    interest_rate: Option<f64>,
    investment_date: Option<NaiveDate>,
    maturity_date: Option<NaiveDate>,
    token_allocation: Option<f64>,
}

impl CsvRow {
    fn into_holding(self) -> Result<Holding> {
        let security = match self.security_type.trim().to_ascii_lowercase().as_str() {
            "common" => Security::Common,
            "preferred" => Security::Preferred {
                liquidation_preference_multiple: self.liquidation_preference_multiple.unwrap_or(1.0),
                participation_multiple: self.participation_multiple,
            },
            "convertible_note" | "note" => Security::ConvertibleNote {
                conversion_cap: self.conversion_cap,
                conversion_discount: self.conversion_discount,
                interest_rate: self.interest_rate,
                investment_date: self.investment_date,
                maturity_date: self.maturity_date,
            },
            "safe" => Security::Safe {
                conversion_cap: self.conversion_cap,
                conversion_discount: self.conversion_discount,
            },
            "token" => Security::Token {
                token_allocation: self.token_allocation.ok_or_else(|| {
                    CapTableError::inconsistent(&self.id, "token row without token_allocation")
                })?,
            },
            other => {
                return Err(CapTableError::inconsistent(
                    &self.id,
                    format!("unknown security type: {}", other),
                ))
            }
        };

        let holder = if self.holder.is_empty() { self.id.clone() } else { self.holder };

        Ok(Holding {
            id: self.id,
            holder,
            security,
            subscription_amount: self.subscription_amount,
            ownership_percentage: self.ownership_percentage,
            converted_from: None,
        })
    }
}

/// Load all holdings from a CSV file
pub fn load_holdings<P: AsRef<Path>>(path: P) -> Result<Vec<Holding>> {
    let reader = Reader::from_path(path)?;
    collect_rows(reader)
}

/// Load holdings from any reader (e.g., string buffer, upload stream)
pub fn load_holdings_from_reader<R: std::io::Read>(reader: R) -> Result<Vec<Holding>> {
    collect_rows(Reader::from_reader(reader))
}

fn collect_rows<R: std::io::Read>(mut reader: Reader<R>) -> Result<Vec<Holding>> {
    let mut holdings = Vec::new();

    for result in reader.deserialize() {
        let row: CsvRow = result?;
        holdings.push(row.into_holding()?);
    }

    validate_holdings(&holdings)?;
    log::debug!("loaded {} holdings from roster", holdings.len());

    Ok(holdings)
}
