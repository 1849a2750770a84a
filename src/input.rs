//! JSON scenario files
//!
//! A scenario file bundles engine configuration, the baseline cap table,
//! named round sequences and the exit values to evaluate.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::round::{CapTable, Round};
use crate::scenario::ScenarioEngine;

/// One named scenario as written in a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioEntry {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub rounds: Vec<Round>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioFile {
    #[serde(default)]
    pub config: EngineConfig,
    pub baseline: CapTable,
    #[serde(default)]
    pub scenarios: Vec<ScenarioEntry>,
    #[serde(default)]
    pub exit_values: Vec<f64>,
    #[serde(default)]
    pub total_token_supply: f64,
}

impl ScenarioFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Engine with every scenario created and its rounds appended in order
    pub fn build_engine(&self) -> Result<ScenarioEngine> {
        let mut engine = ScenarioEngine::with_config(self.baseline.clone(), self.config.clone());
        for entry in &self.scenarios {
            let id = engine.create_scenario(entry.name.clone());
            if let Some(label) = &entry.label {
                engine.set_label(id, label.clone())?;
            }
            for round in &entry.rounds {
                engine.add_round(id, round.clone())?;
            }
        }
        Ok(engine)
    }
}
