//! Pkgflow - download, install and check pipeline for lockfile-pinned packages
//!
//! Orchestrates:
//! 1. Processing order resolution (using pkgflow-graph)
//! 2. Downloads, installs and checks (using the pkgflow-core engine)
//! 3. Check log classification and the run summary

mod commands;

use clap::Parser;
use commands::{Cli, CommandError, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), CommandError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pkgflow=info,pkgflow_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let failed = match cli.command {
        Commands::Run {
            lockfile,
            config,
            work_dir,
            download_jobs,
            install_jobs,
            check_jobs,
            select,
            check_all,
            fail_on,
            html_logs,
            strict,
        } => {
            let overrides = commands::run::Overrides {
                work_dir,
                download_jobs,
                install_jobs,
                check_jobs,
                select,
                check_all,
                fail_on,
                html_logs,
            };
            let should_fail = commands::run::execute(&lockfile, config.as_deref(), overrides).await?;
            strict && should_fail
        }
        Commands::Order { lockfile, format } => {
            commands::order::execute(&lockfile, format)?;
            false
        }
        Commands::ParseLog {
            log,
            fail_on,
            flush_trailing,
            format,
        } => commands::parse_log::execute(&log, fail_on.as_deref(), flush_trailing, format)?,
        Commands::Select { dir, expr, all } => {
            commands::select::execute(&dir, &expr, all)?;
            false
        }
    };

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
