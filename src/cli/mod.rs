//! CLI interface for poly-notify
//!
//! Provides subcommands for:
//! - `run`: Start the notification pipeline
//! - `status`: Summarize the persisted state
//! - `config`: Show the effective configuration

mod run;
mod status;

pub use run::RunArgs;
pub use status::StatusArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "poly-notify")]
#[command(about = "Polymarket new-market and price-move notifier")]
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
    /// Start the notification pipeline
    Run(RunArgs),
    /// Summarize the persisted state
    Status(StatusArgs),
    /// Show the effective configuration
    Config,
}
