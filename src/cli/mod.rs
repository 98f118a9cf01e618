//! CLI interface for paper-desk
//!
//! Provides subcommands for:
//! - `simulate`: run a deterministic seeded paper session
//! - `status`: show the persisted portfolio snapshot
//! - `config`: show the effective configuration

mod simulate;

pub use simulate::SimulateArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "paper-desk")]
#[command(about = "Simulated-exchange engine for rehearsing trading strategies")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a deterministic seeded paper session
    Simulate(SimulateArgs),
    /// Show the persisted portfolio snapshot
    Status,
    /// Show the effective configuration
    Config,
}
