//! Check job: run the toolchain's verification mode and classify its output

use crate::executor::{Cost, EngineError, JobResult, Outcome, PackageOutcome, Phase, PhaseJob};
use crate::log_parser::LogParser;
use crate::logs::LogStore;
use crate::toolchain::{Invocation, Toolchain};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Toolchain verb for verification
pub const CHECK_VERB: &str = "check";

/// Shared inputs of every check job
#[derive(Debug, Clone)]
pub struct CheckSettings {
    /// Each package is checked in its own directory below this one
    pub checks_dir: PathBuf,
    /// Library holding the installed packages
    pub library_dir: PathBuf,
    pub options: Vec<String>,
    /// Environment variable pointing the toolchain at the library
    pub library_env: Option<String>,
    pub parser: LogParser,
    pub logs: LogStore,
}

/// Build the check job for one package
pub fn check_job(
    toolchain: Arc<dyn Toolchain>,
    settings: Arc<CheckSettings>,
    package: String,
    artifact: PathBuf,
) -> PhaseJob<JobResult> {
    PhaseJob::new(package.clone(), async move {
        let start = Instant::now();
        let workdir = settings.checks_dir.join(&package);
        tokio::fs::create_dir_all(&workdir)
            .await
            .map_err(|e| EngineError::io(&workdir, e))?;

        let mut invocation = Invocation::new(CHECK_VERB, artifact)
            .options(settings.options.iter().cloned())
            .workdir(&workdir);
        if let Some(var) = &settings.library_env {
            invocation = invocation.env(var.clone(), settings.library_dir.display().to_string());
        }

        let out = match toolchain.invoke(&invocation).await {
            Ok(out) => out,
            Err(e) => {
                let log = settings.logs.write(Phase::Check, &package, &e.to_string()).await?;
                return Ok(JobResult::failure(
                    Phase::Check,
                    &package,
                    Outcome::ToolchainFailed,
                    e.to_string(),
                    Cost::elapsed(start.elapsed()),
                )
                .with_log(log));
            }
        };

        let log = settings.logs.write(Phase::Check, &package, &out.output).await?;
        let parsed = settings.parser.parse(&out.output);
        let status = parsed.status_line();
        let elapsed = start.elapsed();
        let check = PackageOutcome::from_parsed(parsed, elapsed);
        debug!(
            package = %package,
            severity = %check.severity,
            should_fail = check.should_fail,
            findings = check.findings.len(),
            "check output classified"
        );

        let result = if out.success && !check.failed() {
            JobResult::success(
                Phase::Check,
                &package,
                format!("{package}: {status}"),
                Cost::elapsed(elapsed),
                workdir,
            )
        } else {
            let reason = match out.exit_code {
                Some(0) if check.should_fail => "matched fail pattern".to_string(),
                Some(0) => format!("status {}", check.severity),
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            };
            JobResult::failure(
                Phase::Check,
                &package,
                Outcome::ToolchainFailed,
                format!("{package}: {status} ({reason})"),
                Cost::elapsed(elapsed),
            )
        };

        Ok(result.with_log(log).with_check(check))
    })
}
