use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod ui;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let parsed = cli::Cli::parse();

    // Suite failures surface as errors, which exit with status 1
    parsed.dispatch().await
}
