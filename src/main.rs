use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;

use cli::{run_command, Cli};

/// Default log directive: crate at info, everything else quiet
const DEFAULT_LOG_FILTER: &str = "floodwarden=info";

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("floodwarden=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(e) = run_command(cli).await {
        eprintln!("floodwarden: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
