//! `rsmerge` binary.
//!
//! A thin shim over [`rsmerge_cli`]: parse flags, install logging, run.

use clap::Parser;
use rsmerge_cli::Cli;
use std::io;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    rsmerge_cli::run(cli)
}
