//! Pkgflow command-line interface
//!
//! - `run`: download, install and check every package of a lockfile
//! - `order`: print the processing order of a lockfile
//! - `parse-log`: classify a saved check log
//! - `select`: evaluate a selection expression over a directory

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod order;
pub mod parse_log;
pub mod run;
pub mod select;

/// Error type shared by all commands
pub type CommandError = Box<dyn std::error::Error + Send + Sync>;

/// Pkgflow - download, install and check pinned package sets
#[derive(Parser)]
#[command(name = "pkgflow")]
#[command(about = "Download, install and check every package of a lockfile")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the download, install and check phases
    Run {
        /// Lockfile to process
        #[arg(short, long, default_value = "renv.lock")]
        lockfile: PathBuf,

        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Work directory (overrides the configuration)
        #[arg(short, long)]
        work_dir: Option<PathBuf>,

        /// Concurrent downloads
        #[arg(long)]
        download_jobs: Option<usize>,

        /// Concurrent installs
        #[arg(long)]
        install_jobs: Option<usize>,

        /// Concurrent checks
        #[arg(long)]
        check_jobs: Option<usize>,

        /// Selection expression for the check phase, e.g. "teal,rtables"
        #[arg(short, long)]
        select: Option<String>,

        /// Check every installed package when no selection is given
        #[arg(long)]
        check_all: bool,

        /// Regex that escalates matching notes and warnings to failures
        #[arg(long)]
        fail_on: Option<String>,

        /// Write per-package logs as escaped HTML
        #[arg(long)]
        html_logs: bool,

        /// Exit non-zero when any package failed
        #[arg(long)]
        strict: bool,
    },

    /// Print the processing order of a lockfile
    Order {
        /// Lockfile to resolve
        #[arg(short, long, default_value = "renv.lock")]
        lockfile: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Classify a saved check log
    ParseLog {
        /// Log file to parse
        log: PathBuf,

        /// Regex that escalates matching notes and warnings to failures
        #[arg(long)]
        fail_on: Option<String>,

        /// Keep the item still open at the end of the log
        #[arg(long)]
        flush_trailing: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List the archives in a directory a selection expression accepts
    Select {
        /// Directory holding source archives
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Selection expression
        #[arg(default_value = "")]
        expr: String,

        /// Select everything when the expression is empty
        #[arg(long)]
        all: bool,
    },
}

/// Output format for commands that print structured data
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
