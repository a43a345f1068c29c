//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Allocator CLI - Run rebase allocator scenarios
#[derive(Parser, Debug)]
#[command(name = "allocator")]
#[command(about = "CLI tool for running rebase allocator scenarios", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "table")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute every step of a scenario and report each one
    Run(ScenarioArgs),
    /// Execute a scenario and show only the final positions
    Positions(ScenarioArgs),
}

#[derive(Parser, Debug)]
pub struct ScenarioArgs {
    /// Path to a scenario JSON file
    pub scenario: PathBuf,

    /// Stop after this many steps
    #[arg(long)]
    pub steps: Option<usize>,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}
