//! ContextPack CLI: scan a company website into a draft context pack.
//!
//! Prints the scan's `{status, body}` envelope as JSON on stdout; logs and
//! progress go to stderr.

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
