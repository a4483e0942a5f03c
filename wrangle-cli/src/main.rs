//! Entry point for the `osm-wrangle` command-line interface.
#![forbid(unsafe_code)]

use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

fn main() -> eyre::Result<()> {
    // Captures `log` records from the library crates. Stdout carries the report.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    wrangle_cli::run().wrap_err("osm-wrangle failed")
}
