// SPDX-License-Identifier: MIT

//! `sv` — run a single isolated scan from the command line.
//!
//! Thin by design (`spec.md` §6): this binary owns one scan's worker pool
//! end to end (create → run → poll → cancel-on-signal → drain), and leaves
//! everything else — multi-scan fleet management, issue/history reporting —
//! to the `svd` daemon and its own collaborators.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Command, GetCommand};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Scan(args) => commands::scan::run(args).await,
        Command::Get(GetCommand::Scans { workspace }) => commands::get::scans(workspace).await,
        Command::Get(GetCommand::ScanJobs { scan_id }) => commands::get::scan_jobs(scan_id).await,
    }
}
