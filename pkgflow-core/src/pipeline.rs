//! Phase orchestration: resolve, download, install, check, summarize
//!
//! Each phase drains completely before the next one starts. Install jobs are
//! submitted in processing order and only for packages whose download
//! succeeded; check jobs only for installed packages the selection accepts.

use crate::config::{ConfigError, PipelineConfig};
use crate::executor::{
    EngineError, JobReport, JobResult, Phase, PhaseJob, PhaseRun, ResultStore, TaskEngine,
};
use crate::jobs::{
    CheckSettings, DownloadSettings, InstallSettings, check_job, download_job, install_job,
};
use crate::lockfile::Lockfile;
use crate::log_parser::LogParser;
use crate::logs::LogStore;
use crate::reports::RunSummary;
use crate::selection::Selection;
use crate::toolchain::{CommandToolchain, Toolchain};
use crate::transport::{HttpGitTransport, SourceTransport};
use pkgflow_graph::{DependencyGraph, ProcessingOrder};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that end a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Outcome of a complete run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub summary: RunSummary,
    /// Engine statistics per phase, in execution order
    pub runs: Vec<PhaseRun>,
}

/// Resolved processing order of a lockfile
#[derive(Debug, Clone)]
pub struct Plan {
    /// Lockfile packages, dependencies first
    pub order: ProcessingOrder,
    pub graph: DependencyGraph,
    pub cycles: Vec<Vec<String>>,
}

/// Runs all phases for one lockfile
pub struct Pipeline {
    config: PipelineConfig,
    transport: Arc<dyn SourceTransport>,
    toolchain: Arc<dyn Toolchain>,
    selection: Selection,
    install: Arc<InstallSettings>,
    check: Arc<CheckSettings>,
}

impl Pipeline {
    /// Validate the configuration and wire the collaborators
    ///
    /// Relative `work_dir` and `library_dir` are resolved against the
    /// current directory here, once.
    pub fn new(
        mut config: PipelineConfig,
        transport: Arc<dyn SourceTransport>,
        toolchain: Arc<dyn Toolchain>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        config.absolutize()?;

        let logs = LogStore::new(config.logs_dir(), config.html_logs);
        let library_env = config.toolchain.library_env.clone();
        let install = Arc::new(InstallSettings {
            library_dir: config.library_dir(),
            options: config.install_options.clone(),
            library_env: library_env.clone(),
            logs: logs.clone(),
        });
        let check = Arc::new(CheckSettings {
            checks_dir: config.checks_dir(),
            library_dir: config.library_dir(),
            options: config.check_options.clone(),
            library_env,
            parser: LogParser::new(config.parser_config()?),
            logs,
        });

        Ok(Self {
            selection: config.selection()?,
            config,
            transport,
            toolchain,
            install,
            check,
        })
    }

    /// Pipeline with the HTTP/git transport and the configured command
    pub fn from_config(config: PipelineConfig) -> PipelineResult<Self> {
        let toolchain = CommandToolchain::new(
            config.toolchain.program.clone(),
            config.toolchain.args.clone(),
        );
        Self::new(config, Arc::new(HttpGitTransport::new()), Arc::new(toolchain))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processing order of the lockfile's packages, with cycles reported
    pub fn plan(lockfile: &Lockfile) -> Plan {
        let graph = DependencyGraph::from_edges(lockfile.dependency_edges());
        let cycles = graph.find_cycles();
        for cycle in &cycles {
            warn!(
                cycle = %cycle.join(" -> "),
                "Dependency cycle, order inside it is best effort"
            );
        }

        let order = graph.resolve().retain(|name| lockfile.get(name).is_some());
        Plan { order, graph, cycles }
    }

    /// Run every phase and write the summary
    pub async fn run(&self, lockfile: &Lockfile) -> PipelineResult<PipelineReport> {
        let Plan { order, graph, cycles } = Self::plan(lockfile);
        info!(
            packages = order.len(),
            work_dir = %self.config.work_dir.display(),
            "Resolved processing order"
        );
        create_dir(&self.config.work_dir)?;
        create_dir(&self.config.library_dir())?;

        // Download
        let mut repositories = self.config.repositories.clone();
        repositories.extend(lockfile.repository_urls());
        let download_settings = Arc::new(DownloadSettings {
            downloads_dir: self.config.downloads_dir(),
            repositories,
        });
        let jobs = order
            .iter()
            .filter_map(|name| lockfile.get(name))
            .map(|pkg| download_job(Arc::clone(&self.transport), Arc::clone(&download_settings), pkg.clone()))
            .collect();
        let (download_run, downloads) = self.run_phase(Phase::Download, jobs).await?;

        // Install, in processing order
        let downloaded = succeeded_artifacts(&downloads);
        let jobs = order
            .iter()
            .filter_map(|name| downloaded.get(name).map(|artifact| (name, artifact)))
            .map(|(name, artifact)| {
                install_job(
                    Arc::clone(&self.toolchain),
                    Arc::clone(&self.install),
                    name.to_string(),
                    (*artifact).to_path_buf(),
                )
            })
            .collect();
        let (install_run, installs) = self.run_phase(Phase::Install, jobs).await?;

        // Check, for selected installed packages
        let installed = succeeded_artifacts(&installs);
        let jobs = order
            .iter()
            .filter(|name| installed.contains_key(name))
            .filter_map(|name| {
                let pkg = lockfile.get(name)?;
                if !self.selection.matches(&pkg.archive_name()) {
                    return None;
                }
                downloaded.get(name).map(|artifact| (name, *artifact))
            })
            .map(|(name, artifact)| {
                check_job(
                    Arc::clone(&self.toolchain),
                    Arc::clone(&self.check),
                    name.to_string(),
                    artifact.to_path_buf(),
                )
            })
            .collect();
        let (check_run, checks) = self.run_phase(Phase::Check, jobs).await?;

        let summary = RunSummary::from_phases(
            order,
            &[
                (Phase::Download, &downloads[..]),
                (Phase::Install, &installs[..]),
                (Phase::Check, &checks[..]),
            ],
        )
        .with_graph(graph.fingerprint(), cycles);
        summary.write(&self.config.summary_path())?;

        info!(
            status = ?summary.status,
            failed = summary.failed_packages().len(),
            summary = %self.config.summary_path().display(),
            "Pipeline finished"
        );

        Ok(PipelineReport {
            summary,
            runs: vec![download_run, install_run, check_run],
        })
    }

    async fn run_phase(&self, phase: Phase, jobs: Vec<PhaseJob<JobResult>>) -> PipelineResult<(PhaseRun, Vec<JobResult>)> {
        let mut store = ResultStore::create(self.config.results_path(phase))?;
        let engine = TaskEngine::new(self.config.engine_config(phase));
        let run = engine.run(jobs, &mut store).await?;
        Ok((run, store.into_results()))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

/// Artifacts of the successful results, by package
fn succeeded_artifacts(results: &[JobResult]) -> HashMap<&str, &Path> {
    results
        .iter()
        .filter(|r| r.succeeded())
        .filter_map(|r| r.artifact.as_deref().map(|a| (r.package.as_str(), a)))
        .collect()
}

fn create_dir(dir: &Path) -> Result<(), EngineError> {
    std::fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))
}
