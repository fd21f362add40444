//! Binary crate for the `surfcast` command-line tool.
//!
//! This crate focuses on:
//! - Triggering one ingestion run
//! - Reading the stored forecast as a table or as JSON
//! - Interactive configuration

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod display;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cmd.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    cmd.run().await
}
