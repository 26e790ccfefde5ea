//! Pricewatch command-line entry point.

use clap::Parser;
use pricewatch_client::{commands, telemetry, Catalog, CliError, ClientConfig, Invocation};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {}", err);
        std::process::exit(err.exit_code());
    }
}

async fn run() -> Result<(), CliError> {
    let invocation = Invocation::parse();
    let config = ClientConfig::load(invocation.config.clone())?;
    telemetry::init_tracing(config.log_format)?;

    let catalog = Catalog::from_config(&config)?;
    let output = commands::run(&catalog, &invocation.command).await?;
    print!("{}", output);

    let stats = catalog.stats();
    tracing::debug!(
        hits = stats.hits,
        misses = stats.misses,
        entries = stats.entry_count,
        "Cache statistics"
    );
    Ok(())
}
