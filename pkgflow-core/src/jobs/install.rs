//! Install job: build a downloaded artifact into the package library

use crate::executor::{Cost, JobResult, Outcome, Phase, PhaseJob};
use crate::logs::LogStore;
use crate::toolchain::{Invocation, Toolchain};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Toolchain verb for installation
pub const INSTALL_VERB: &str = "INSTALL";

/// Shared inputs of every install job
#[derive(Debug, Clone)]
pub struct InstallSettings {
    /// Library packages are installed into
    pub library_dir: PathBuf,
    /// Extra toolchain options, placed before the library option
    pub options: Vec<String>,
    /// Environment variable pointing the toolchain at the library
    pub library_env: Option<String>,
    pub logs: LogStore,
}

impl InstallSettings {
    fn invocation(&self, artifact: PathBuf) -> Invocation {
        let library = self.library_dir.display().to_string();
        let mut invocation = Invocation::new(INSTALL_VERB, artifact)
            .options(self.options.iter().cloned())
            .options(["-l".to_string(), library.clone()]);
        if let Some(var) = &self.library_env {
            invocation = invocation.env(var.clone(), library);
        }
        invocation
    }
}

/// Build the install job for one package
pub fn install_job(
    toolchain: Arc<dyn Toolchain>,
    settings: Arc<InstallSettings>,
    package: String,
    artifact: PathBuf,
) -> PhaseJob<JobResult> {
    PhaseJob::new(package.clone(), async move {
        let start = Instant::now();
        let invocation = settings.invocation(artifact);

        let (result, output) = match toolchain.invoke(&invocation).await {
            Ok(out) if out.success => (
                JobResult::success(
                    Phase::Install,
                    &package,
                    format!("{package} installed"),
                    Cost::elapsed(start.elapsed()),
                    settings.library_dir.join(&package),
                ),
                out.output,
            ),
            Ok(out) => (
                JobResult::failure(
                    Phase::Install,
                    &package,
                    Outcome::ToolchainFailed,
                    match out.exit_code {
                        Some(code) => format!("{package} install failed with exit code {code}"),
                        None => format!("{package} install terminated by signal"),
                    },
                    Cost::elapsed(start.elapsed()),
                ),
                out.output,
            ),
            Err(e) => (
                JobResult::failure(
                    Phase::Install,
                    &package,
                    Outcome::ToolchainFailed,
                    e.to_string(),
                    Cost::elapsed(start.elapsed()),
                ),
                e.to_string(),
            ),
        };

        let log = settings.logs.write(Phase::Install, &package, &output).await?;
        Ok(result.with_log(log))
    })
}
