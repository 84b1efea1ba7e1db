// SPDX-License-Identifier: MIT

//! Argument definitions for the `sv` binary (`spec.md` §6).

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sv", version, about = "Run and inspect a single isolated scan")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create, run, and drive a single isolated scan to completion.
    Scan(ScanArgs),
    /// Read-only lookups against the job queue.
    #[command(subcommand)]
    Get(GetCommand),
}

#[derive(Args)]
pub struct ScanArgs {
    /// Workspace the scan belongs to.
    #[arg(long)]
    pub workspace: String,
    /// Seed URL to crawl from. Repeatable.
    #[arg(long = "url", required = true)]
    pub urls: Vec<String>,
    /// Maximum crawl depth.
    #[arg(long, default_value_t = 3)]
    pub max_depth: u32,
    /// Maximum pages crawled per site.
    #[arg(long, default_value_t = 500)]
    pub max_pages_per_site: u32,
    /// Number of workers dedicated to this scan.
    #[arg(long, default_value_t = 3)]
    pub worker_count: usize,
    /// Seconds to keep the worker pool up after the scan reaches a terminal
    /// status, so out-of-band interactions (e.g. a manual re-test job) still
    /// have workers to claim them.
    #[arg(long, default_value_t = 5)]
    pub grace_period_secs: u64,
    /// Postgres connection string. Falls back to `DATABASE_URL`, then to an
    /// in-memory store if neither is set.
    #[arg(long)]
    pub database_url: Option<String>,
}

#[derive(Subcommand)]
pub enum GetCommand {
    /// List scans, optionally scoped to one workspace.
    Scans {
        #[arg(long)]
        workspace: Option<String>,
    },
    /// List queued jobs belonging to one scan.
    ScanJobs {
        scan_id: String,
    },
}
