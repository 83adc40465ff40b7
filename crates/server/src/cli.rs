//! CLI argument parsing and subcommand dispatch.

use clap::{Parser, Subcommand};

use collector_core::Config;

use crate::startup;

/// Polls the upstream game-result API and serves the de-duplicated history.
#[derive(Parser, Debug)]
#[command(name = "collector-server", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the HTTP server and the collection scheduler (default)
    Serve,
    /// Run one collection cycle against the configured store, then exit
    CollectOnce,
    /// Print a summary of the persisted history
    Inspect,
}

pub async fn dispatch(config: &Config, cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => startup::serve(config).await,
        Command::CollectOnce => startup::collect_once(config).await,
        Command::Inspect => startup::inspect(config),
    }
}
