//! Cap Table CLI
//!
//! Runs scenario files through the round simulator and exit waterfall

use anyhow::{bail, Context, Result};
use cap_table_engine::holding::load_holdings;
use cap_table_engine::waterfall::{breakeven_exit, exit_range, sweep_exit_values};
use cap_table_engine::{DistributionReport, FinalCapTable, ScenarioEngine, ScenarioFile, WaterfallDistributor};
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cap_table", version, about = "Cap table dilution and exit waterfall modeling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the final cap table of each scenario
    CapTable(ScenarioArgs),

    /// Distribute exit proceeds for a scenario
    Waterfall {
        #[command(flatten)]
        input: ScenarioArgs,

        /// Exit values; defaults to those in the scenario file
        #[arg(long = "exit")]
        exits: Vec<f64>,

        /// Write per-holding rows to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Evaluate a range of exit values
    Sweep {
        #[command(flatten)]
        input: ScenarioArgs,

        #[arg(long)]
        from: f64,

        #[arg(long)]
        to: f64,

        #[arg(long, default_value_t = 10)]
        steps: usize,
    },
}

#[derive(Args)]
struct ScenarioArgs {
    /// Scenario file (JSON)
    #[arg(long)]
    scenario: PathBuf,

    /// CSV roster replacing the baseline holdings
    #[arg(long)]
    roster: Option<PathBuf>,

    /// Scenario name; defaults to all scenarios (or the first, for waterfalls)
    #[arg(long)]
    name: Option<String>,
}

impl ScenarioArgs {
    fn load(&self) -> Result<(ScenarioFile, ScenarioEngine)> {
        let mut file = ScenarioFile::load(&self.scenario)
            .with_context(|| format!("reading scenario file {}", self.scenario.display()))?;
        if let Some(roster) = &self.roster {
            file.baseline.holdings =
                load_holdings(roster).with_context(|| format!("reading roster {}", roster.display()))?;
        }
        let engine = file.build_engine().context("building scenarios")?;
        Ok((file, engine))
    }

    fn final_tables(&self, engine: &ScenarioEngine, all: bool) -> Result<Vec<(String, FinalCapTable)>> {
        let selected: Vec<_> = engine
            .scenarios()
            .iter()
            .filter(|s| self.name.as_ref().map_or(true, |n| &s.name == n))
            .take(if all || self.name.is_some() { usize::MAX } else { 1 })
            .collect();
        if selected.is_empty() {
            bail!("no matching scenario in {}", self.scenario.display());
        }

        selected
            .into_iter()
            .map(|s| {
                let table = engine
                    .compute_final_cap_table(s.id)
                    .with_context(|| format!("computing scenario '{}'", s.name))?;
                Ok((s.name.clone(), table))
            })
            .collect()
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::CapTable(input) => {
            let (_, engine) = input.load()?;
            for (name, table) in input.final_tables(&engine, true)? {
                print_cap_table(&name, &table);
            }
        }
        Command::Waterfall { input, exits, csv } => {
            let (file, engine) = input.load()?;
            let exits = if exits.is_empty() { file.exit_values.clone() } else { exits };
            if exits.is_empty() {
                bail!("no exit values given");
            }

            let distributor = WaterfallDistributor::new(file.config.clone());
            for (name, table) in input.final_tables(&engine, false)? {
                print_cap_table(&name, &table);
                for &exit in &exits {
                    let report = distributor
                        .distribute(&table.holdings, exit, file.total_token_supply)
                        .with_context(|| format!("waterfall at {}", exit))?;
                    print_report(&report);

                    if let Some(path) = &csv {
                        let out = File::create(path).with_context(|| format!("creating {}", path.display()))?;
                        report.write_csv(out)?;
                        println!("Rows written to: {}", path.display());
                    }
                }
            }
        }
        Command::Sweep { input, from, to, steps } => {
            let (file, engine) = input.load()?;
            let distributor = WaterfallDistributor::new(file.config.clone());
            let exits = exit_range(from, to, steps);

            for (name, table) in input.final_tables(&engine, false)? {
                let reports = sweep_exit_values(&distributor, &table.holdings, &exits, file.total_token_supply)?;

                println!("\nExit sweep: {}", name);
                println!("{:>16} {:>14} {:>14} {:>14}", "Exit", "Preferences", "Participation", "Common");
                println!("{}", "-".repeat(62));
                for report in &reports {
                    println!(
                        "{:>16.0} {:>14.0} {:>14.0} {:>14.0}",
                        report.exit_value, report.preference_pool, report.participation_pool, report.common_pool
                    );
                }
                match breakeven_exit(&reports) {
                    Some(exit) => println!("Investors made whole from: ${:.0}", exit),
                    None => println!("Investors not made whole within range"),
                }
            }
        }
    }

    Ok(())
}

fn print_cap_table(name: &str, table: &FinalCapTable) {
    println!("\nScenario: {}", name);
    for round in &table.rounds {
        println!(
            "  {:<20} pre ${:.0} -> post ${:.0} (x{:.2}{}), price ${:.4}, converted {}",
            round.name,
            round.pre_money_valuation,
            round.post_money_valuation,
            round.step_up,
            if round.down_round { ", down round" } else { "" },
            round.share_price,
            round.converted_count,
        );
    }
    println!("  Final valuation: ${:.0}  Shares: {:.0}", table.final_valuation, table.total_shares);
    println!("{:>24} {:>18} {:>14} {:>10}", "Holding", "Security", "Invested", "Own %");
    println!("{}", "-".repeat(70));
    for holding in &table.holdings {
        let ownership = holding
            .ownership_percentage
            .map(|o| format!("{:.4}", o * 100.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>24} {:>18} {:>14.0} {:>10}",
            holding.id,
            holding.kind().as_str(),
            holding.subscription_amount,
            ownership
        );
    }
}

fn print_report(report: &DistributionReport) {
    println!("\nExit value: ${:.0}", report.exit_value);
    if let Some(factor) = report.preference_haircut {
        println!("  Preferences cut to {:.2}% of claims", factor * 100.0);
    }
    println!("{:>24} {:>14} {:>14} {:>14} {:>8} {:>8}", "Holding", "Preference", "Common", "Return", "Multiple", "% Exit");
    println!("{}", "-".repeat(88));
    for row in &report.rows {
        let multiple = row.multiple.map(|m| format!("{:.2}x", m)).unwrap_or_else(|| "-".to_string());
        println!(
            "{:>24} {:>14.0} {:>14.0} {:>14.0} {:>8} {:>8.2}",
            row.holding_id,
            row.preference_amount,
            row.common_distribution + row.participation_amount,
            row.total_return,
            multiple,
            row.percent_of_exit
        );
    }
    println!("  Equity total: ${:.0}  Tokens: ${:.0}", report.equity_total, report.token_pool);
}
