//! Scenario run command implementation.

use anyhow::Result;

use crate::cli::{OutputFormat, ScenarioArgs};
use crate::output::{build_report, format_steps_table, format_summary};
use crate::scenario::{self, Scenario};

pub fn run_scenario(args: &ScenarioArgs, format: OutputFormat) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let (world, outcomes) = scenario::execute(&scenario, args.steps)?;

    match format {
        OutputFormat::Table => {
            println!("{}", format_steps_table(&outcomes, world.decimals));
            println!();
            println!("{}", format_summary(&world)?);
        }
        OutputFormat::Json => {
            let report = build_report(&world, &outcomes)?;
            let json = serde_json::to_string_pretty(&report)?;
            println!("{}", json);
        }
    }

    Ok(())
}
