mod cli;
mod config;
mod crawl;
mod csv_table;
mod download;
mod error;
mod orchestrator;
mod routing;
mod source;
mod store;
mod transcode;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, Cli, Commands};
use tracing_subscriber::EnvFilter;

/// Exit status when the download tree cannot be written.
const EXIT_PERSISTENCE: i32 = 2;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Run {} => command::run(&cli.settings).await,
        Commands::Once { source } => command::once(&cli.settings, *source).await.map(|s| {
            println!(
                "{source}: {} files, {} written, {} skipped, {} failed",
                s.discovered, s.written, s.skipped, s.failed
            );
        }),
    };

    if let Err(e) = result {
        let fatal = e
            .downcast_ref::<error::Error>()
            .map(error::Error::is_fatal)
            .unwrap_or(false);
        tracing::error!(error = %e, "stopping");
        if fatal {
            std::process::exit(EXIT_PERSISTENCE);
        }
        return Err(e);
    }

    Ok(())
}
