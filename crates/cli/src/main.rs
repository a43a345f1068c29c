//! Allocator CLI - Run rebase allocator scenarios against an in-memory world.

mod amount;
mod cli;
mod commands;
mod output;
mod scenario;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{run_positions, run_scenario};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            run_scenario(&args, cli.format)?;
        }
        Commands::Positions(args) => {
            run_positions(&args, cli.format)?;
        }
    }

    Ok(())
}
