//! Final positions command implementation.

use anyhow::Result;

use crate::cli::{OutputFormat, ScenarioArgs};
use crate::output::{build_report, format_summary};
use crate::scenario::{self, Scenario};

pub fn run_positions(args: &ScenarioArgs, format: OutputFormat) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let (world, _) = scenario::execute(&scenario, args.steps)?;

    match format {
        OutputFormat::Table => {
            println!("{}", format_summary(&world)?);
        }
        OutputFormat::Json => {
            let report = build_report(&world, &[])?;
            let json = serde_json::to_string_pretty(&report)?;
            println!("{}", json);
        }
    }

    Ok(())
}
