//! Scenario engine for what-if financing sequences
//!
//! Holds a baseline cap table and any number of named scenarios, each owning
//! an ordered list of rounds. The final cap table for a scenario is always
//! recomputed from the baseline by folding the round simulator over its
//! rounds, so nothing is cached between calls.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{CapTableError, Result};
use crate::holding::Holding;
use crate::round::{CapTable, Round, RoundSimulator};

/// Identifier of a scenario within an engine
pub type ScenarioId = u32;

/// A named, ordered sequence of rounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: ScenarioId,
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    rounds: Vec<Round>,
}

impl Scenario {
    fn new(id: ScenarioId, name: String) -> Self {
        Self {
            id,
            name,
            label: None,
            rounds: Vec::new(),
        }
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }
}

/// Per-round figures recorded while folding a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub name: String,

    /// Valuation carried in from the previous round (or the baseline)
    pub prior_valuation: f64,
    pub pre_money_valuation: f64,
    pub post_money_valuation: f64,

    /// pre-money / prior valuation
    pub step_up: f64,
    pub down_round: bool,

    pub share_price: f64,
    pub total_shares: f64,
    pub converted_count: usize,
    pub new_holdings: usize,
}

/// Final state of a scenario after all of its rounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalCapTable {
    pub scenario_id: ScenarioId,
    pub holdings: Vec<Holding>,
    pub final_valuation: f64,
    pub total_shares: f64,
    pub rounds: Vec<RoundSummary>,
}

impl FinalCapTable {
    pub fn cap_table(&self) -> CapTable {
        CapTable {
            holdings: self.holdings.clone(),
            valuation: self.final_valuation,
            total_shares: Some(self.total_shares),
        }
    }
}

/// Fold `rounds` over `baseline` in order. Pure: same inputs, same output.
pub fn fold_rounds(simulator: &RoundSimulator, baseline: &CapTable, rounds: &[Round]) -> Result<(CapTable, Vec<RoundSummary>)> {
    rounds.iter().try_fold(
        (baseline.clone(), Vec::with_capacity(rounds.len())),
        |(table, mut summaries), round| {
            let prior_valuation = table.valuation;
            let result = simulator.simulate(&table, round)?;

            let step_up = if prior_valuation > 0.0 {
                round.pre_money_valuation / prior_valuation
            } else {
                1.0
            };
            let down_round = prior_valuation > 0.0 && round.pre_money_valuation < prior_valuation;
            if down_round {
                log::warn!(
                    "round '{}' is a down round: pre-money {:.2} below prior valuation {:.2}",
                    round.name,
                    round.pre_money_valuation,
                    prior_valuation
                );
            }

            summaries.push(RoundSummary {
                name: round.name.clone(),
                prior_valuation,
                pre_money_valuation: round.pre_money_valuation,
                post_money_valuation: result.post_money_valuation,
                step_up,
                down_round,
                share_price: result.new_share_price,
                total_shares: result.new_total_shares,
                converted_count: result.converted_count,
                new_holdings: result.new_holdings.len(),
            });

            Ok((result.into_cap_table(), summaries))
        },
    )
}

/// Baseline cap table plus the scenarios branching from it
///
/// # Example
/// ```ignore
/// let mut engine = ScenarioEngine::new(baseline);
/// let id = engine.create_scenario("Aggressive");
/// engine.add_round(id, Round::new("Series A", 10e6, 5e6, 3)?)?;
/// let table = engine.compute_final_cap_table(id)?;
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioEngine {
    baseline: CapTable,
    simulator: RoundSimulator,
    scenarios: Vec<Scenario>,
    next_id: ScenarioId,
}

impl ScenarioEngine {
    pub fn new(baseline: CapTable) -> Self {
        Self::with_config(baseline, EngineConfig::default())
    }

    pub fn with_config(baseline: CapTable, config: EngineConfig) -> Self {
        Self {
            baseline,
            simulator: RoundSimulator::new(config),
            scenarios: Vec::new(),
            next_id: 1,
        }
    }

    pub fn baseline(&self) -> &CapTable {
        &self.baseline
    }

    pub fn config(&self) -> &EngineConfig {
        self.simulator.config()
    }

    /// Start a scenario with no rounds
    pub fn create_scenario(&mut self, name: impl Into<String>) -> ScenarioId {
        let id = self.next_id;
        self.next_id += 1;
        self.scenarios.push(Scenario::new(id, name.into()));
        id
    }

    /// Start a scenario from an existing one. Rounds are deep-copied only
    /// when `copy_rounds` is set.
    pub fn branch_scenario(&mut self, source: ScenarioId, name: impl Into<String>, copy_rounds: bool) -> Result<ScenarioId> {
        let rounds = if copy_rounds {
            self.scenario(source)?.rounds.clone()
        } else {
            // Still reject unknown sources
            self.scenario(source)?;
            Vec::new()
        };
        let id = self.create_scenario(name);
        self.scenario_mut(id)?.rounds = rounds;
        Ok(id)
    }

    pub fn set_label(&mut self, id: ScenarioId, label: impl Into<String>) -> Result<()> {
        self.scenario_mut(id)?.label = Some(label.into());
        Ok(())
    }

    pub fn remove_scenario(&mut self, id: ScenarioId) -> Result<Scenario> {
        let index = self
            .scenarios
            .iter()
            .position(|s| s.id == id)
            .ok_or(CapTableError::UnknownScenario(id))?;
        Ok(self.scenarios.remove(index))
    }

    /// Validate and append a round. Nothing is recomputed here.
    pub fn add_round(&mut self, id: ScenarioId, round: Round) -> Result<()> {
        round.validate()?;
        let scenario = self.scenario_mut(id)?;
        log::debug!("scenario '{}': adding round '{}'", scenario.name, round.name);
        scenario.rounds.push(round);
        Ok(())
    }

    pub fn scenario(&self, id: ScenarioId) -> Result<&Scenario> {
        self.scenarios
            .iter()
            .find(|s| s.id == id)
            .ok_or(CapTableError::UnknownScenario(id))
    }

    fn scenario_mut(&mut self, id: ScenarioId) -> Result<&mut Scenario> {
        self.scenarios
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(CapTableError::UnknownScenario(id))
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Apply every round of the scenario to the baseline, in order
    pub fn compute_final_cap_table(&self, id: ScenarioId) -> Result<FinalCapTable> {
        let scenario = self.scenario(id)?;
        let (table, rounds) = fold_rounds(&self.simulator, &self.baseline, &scenario.rounds)?;

        log::info!(
            "scenario '{}': {} rounds, final valuation {:.2}, {} holdings",
            scenario.name,
            rounds.len(),
            table.valuation,
            table.holdings.len()
        );

        Ok(FinalCapTable {
            scenario_id: id,
            holdings: table.holdings,
            final_valuation: table.valuation,
            total_shares: table.total_shares.unwrap_or(self.config().default_total_shares),
            rounds,
        })
    }

    /// Final cap tables for every scenario, computed in parallel
    pub fn compute_all(&self) -> Vec<(ScenarioId, Result<FinalCapTable>)> {
        self.scenarios
            .par_iter()
            .map(|s| (s.id, self.compute_final_cap_table(s.id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holding::Security;
    use approx::assert_relative_eq;

    fn engine() -> ScenarioEngine {
        ScenarioEngine::new(CapTable::new(vec![Holding::common("founder", 0.0, 1.0)], 5_000_000.0))
    }

    #[test]
    fn test_empty_scenario_returns_baseline() {
        let mut engine = engine();
        let id = engine.create_scenario("Bootstrapped");

        let table = engine.compute_final_cap_table(id).unwrap();
        assert_eq!(table.holdings, engine.baseline().holdings);
        assert_relative_eq!(table.final_valuation, 5_000_000.0);
        assert!(table.rounds.is_empty());
    }

    #[test]
    fn test_two_rounds_fold_forward() {
        let mut engine = engine();
        let id = engine.create_scenario("Base case");
        engine.add_round(id, Round::new("Seed", 4_000_000.0, 1_000_000.0, 2).unwrap()).unwrap();
        engine.add_round(id, Round::new("Series A", 15_000_000.0, 5_000_000.0, 1).unwrap()).unwrap();

        let table = engine.compute_final_cap_table(id).unwrap();

        assert_relative_eq!(table.final_valuation, 20_000_000.0);
        assert_eq!(table.holdings.len(), 4);

        // Founder: 0.8 after seed, then * 0.75
        assert_relative_eq!(table.holdings[0].ownership(), 0.6, epsilon = 1e-12);
        // Seed investors: 0.1 each, then * 0.75
        assert_relative_eq!(table.holdings[1].ownership(), 0.075, epsilon = 1e-12);
        assert_relative_eq!(table.holdings[3].ownership(), 0.25, epsilon = 1e-12);

        let total: f64 = table.holdings.iter().map(|h| h.ownership()).sum();
        assert!((total - 1.0).abs() < 1e-9);

        // Seed carried baseline 5M in; Series A carried seed post-money 5M in
        assert_relative_eq!(table.rounds[0].prior_valuation, 5_000_000.0);
        assert!(table.rounds[0].down_round);
        assert_relative_eq!(table.rounds[1].prior_valuation, 5_000_000.0);
        assert_relative_eq!(table.rounds[1].step_up, 3.0);
        assert!(!table.rounds[1].down_round);
    }

    #[test]
    fn test_compute_is_idempotent() {
        let mut engine = engine();
        let id = engine.create_scenario("Repeat");
        engine.add_round(id, Round::new("Seed", 4_000_000.0, 1_000_000.0, 3).unwrap()).unwrap();

        let first = engine.compute_final_cap_table(id).unwrap();
        let second = engine.compute_final_cap_table(id).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_round_leaves_scenario_unchanged() {
        let mut engine = engine();
        let id = engine.create_scenario("Guarded");
        engine.add_round(id, Round::new("Seed", 4_000_000.0, 1_000_000.0, 1).unwrap()).unwrap();

        let bad = Round {
            name: "Broken".to_string(),
            pre_money_valuation: -1.0,
            amount: 1.0,
            new_investor_count: 1,
            issued_security: Security::Common,
        };
        assert!(engine.add_round(id, bad).is_err());
        assert_eq!(engine.scenario(id).unwrap().rounds().len(), 1);
    }

    #[test]
    fn test_branching_copies_only_on_request() {
        let mut engine = engine();
        let base = engine.create_scenario("Base");
        engine.add_round(base, Round::new("Seed", 4_000_000.0, 1_000_000.0, 1).unwrap()).unwrap();

        let empty = engine.branch_scenario(base, "Fresh", false).unwrap();
        let copy = engine.branch_scenario(base, "Copy", true).unwrap();
        assert!(engine.scenario(empty).unwrap().rounds().is_empty());
        assert_eq!(engine.scenario(copy).unwrap().rounds().len(), 1);

        // Appending to the copy leaves the source alone
        engine.add_round(copy, Round::new("Series A", 12_000_000.0, 3_000_000.0, 1).unwrap()).unwrap();
        assert_eq!(engine.scenario(base).unwrap().rounds().len(), 1);

        assert!(matches!(
            engine.branch_scenario(99, "Nope", true),
            Err(CapTableError::UnknownScenario(99))
        ));
    }

    #[test]
    fn test_compute_all_covers_every_scenario() {
        let mut engine = engine();
        let a = engine.create_scenario("A");
        let b = engine.create_scenario("B");
        engine.add_round(b, Round::new("Seed", 4_000_000.0, 1_000_000.0, 1).unwrap()).unwrap();

        let results = engine.compute_all();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, a);
        assert_eq!(results[1].0, b);
        assert!(results.iter().all(|(_, r)| r.is_ok()));

        engine.remove_scenario(a).unwrap();
        assert!(engine.compute_final_cap_table(a).is_err());
    }
}
