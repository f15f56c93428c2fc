//! tab-dedup: offline driver for the duplicate-tab engine.
//!
//! Runs the same detection and retention logic a browser host uses, against
//! tab snapshots and recorded event logs on disk. Output is JSON on stdout;
//! logs go to stderr.
//!
//! ## Subcommands
//!
//! - `scan`: Report duplicate clusters in a tab snapshot
//! - `replay`: Feed a recorded event log through the engine
//! - `explain`: Show how a URL is normalized and keyed
//! - `request`: Answer one UI panel request against a snapshot
//! - `options`: Initialize and print the stored options

mod explain;
mod input;
mod logging;
mod options;
mod replay;
mod request;
mod scan;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tab-dedup")]
#[command(about = "Duplicate browser tab detector")]
#[command(version)]
struct Cli {
    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report duplicate tabs in a snapshot without closing anything
    Scan {
        /// JSON array of tab snapshots
        #[arg(long)]
        tabs: PathBuf,

        /// Restrict the report to one window
        #[arg(long)]
        window: Option<i64>,

        /// Stored options JSON
        #[arg(long)]
        options: Option<PathBuf>,
    },

    /// Replay a JSONL event log against a tab snapshot
    Replay {
        /// JSON array of tab snapshots present before the first event
        #[arg(long)]
        tabs: PathBuf,

        /// One event envelope per line
        #[arg(long)]
        events: PathBuf,

        /// Stored options JSON
        #[arg(long)]
        options: Option<PathBuf>,
    },

    /// Answer one UI panel request (JSON) against a tab snapshot
    Request {
        /// JSON array of tab snapshots
        #[arg(long)]
        tabs: PathBuf,

        /// Request JSON
        #[arg(long)]
        request: PathBuf,

        /// Stored options JSON
        #[arg(long)]
        options: Option<PathBuf>,
    },

    /// Show URL classification and matching keys
    Explain {
        #[arg(value_name = "URL")]
        url: String,

        /// Stored options JSON
        #[arg(long)]
        options: Option<PathBuf>,
    },

    /// Load, reconcile and persist the stored options
    Options {
        /// Options file (defaults to ~/.tab-dedup/options.json)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    let _logging_guard = logging::init(cli.log_dir.as_deref());

    let result = match &cli.command {
        Commands::Scan {
            tabs,
            window,
            options,
        } => scan::run(tabs, *window, options.as_deref()),
        Commands::Replay {
            tabs,
            events,
            options,
        } => replay::run(tabs, events, options.as_deref()),
        Commands::Request {
            tabs,
            request,
            options,
        } => request::run(tabs, request, options.as_deref()),
        Commands::Explain { url, options } => explain::run(url, options.as_deref()),
        Commands::Options { path } => options::run(path.as_deref()),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "tab-dedup failed");
        std::process::exit(1);
    }
}
