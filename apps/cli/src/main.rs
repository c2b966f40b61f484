//! noteforge CLI: transcripts in, study notes out.
//!
//! Turns subtitle transcripts into a rewritten notes document, a bilingual
//! summary, a mind map and topic tags, one file at a time or as a backfill
//! over a record database.

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
