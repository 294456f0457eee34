//! RoofScout CLI: scan a region for commercial roofs and export the leads.
//!
//! Finds large commercial properties through a grounded search, estimates
//! each roof's type, size, age and condition, and writes the result as CSV.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
