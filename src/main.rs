mod app;
mod attributes;
mod config;
mod feature;
mod geometry;
mod pipeline;
mod shapefile;
mod source;
mod utils;
mod writer;

use anyhow::{Context, Result};
use clap::Parser;

use app::{Cli, load_config, run};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("CLI: Failed to initialize thread pool")?;
    }

    let config = load_config(&cli)?;
    let stats = run(config)?;

    if stats.failed > 0 {
        tracing::warn!("{} record(s) could not be written; see warnings above", stats.failed);
    }

    Ok(())
}
