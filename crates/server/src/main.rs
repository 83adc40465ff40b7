use clap::Parser;
use tracing_subscriber::EnvFilter;

use collector_server::cli::{self, Cli};

fn load_config() -> collector_core::Config {
    collector_core::config::load_dotenv();
    collector_core::Config::from_env()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    cli::dispatch(&config, cli).await
}
