//! pkgflow-core - download, install and check pipeline for pinned package sets
//!
//! Takes a lockfile, computes a dependency-first processing order with
//! **pkgflow-graph**, and drives three phases through a bounded-concurrency
//! engine:
//!
//! 1. **Download**: fetch every package's source archive or checkout
//! 2. **Install**: build downloaded packages into a library, in processing order
//! 3. **Check**: run the toolchain's check verb and classify its output
//!
//! Every phase writes a JSON result file that is rewritten after each job
//! completes. Job failures are recorded as results; only bookkeeping I/O
//! errors end a run.
//!
//! ## Usage
//!
//! ```no_run
//! use pkgflow_core::{Lockfile, Pipeline, PipelineConfig};
//! use std::path::Path;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::from_yaml_file(Path::new("pkgflow.yaml"))?;
//! let lockfile = Lockfile::from_path(Path::new("renv.lock"))?;
//!
//! let report = Pipeline::from_config(config)?.run(&lockfile).await?;
//! println!("{}", report.summary);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod jobs;
pub mod lockfile;
pub mod log_parser;
pub mod logs;
pub mod pipeline;
pub mod reports;
pub mod selection;
pub mod severity;
pub mod toolchain;
pub mod transport;

pub use config::{ConfigError, ConfigResult, PipelineConfig, ToolchainConfig};
pub use executor::{
    Cost, EngineConfig, EngineError, EngineResult, JobMonitor, JobReport, JobResult, Outcome,
    PackageOutcome, Phase, PhaseJob, PhaseRun, PhaseStats, ResultStore, TaskEngine,
};
pub use lockfile::{LockedPackage, Lockfile, LockfileError, SourceKind};
pub use log_parser::{Finding, LogParser, ParsedLog, ParserConfig};
pub use logs::LogStore;
pub use pipeline::{Pipeline, PipelineError, PipelineReport, PipelineResult, Plan};
pub use reports::{PackageSummary, RunStatus, RunSummary};
pub use selection::{Selection, SelectionError};
pub use severity::Severity;
pub use toolchain::{CommandToolchain, Invocation, ToolOutput, Toolchain, ToolchainError};
pub use transport::{HttpGitTransport, SourceTransport, TransportError};

// Graph types used in the public API
pub use pkgflow_graph::{DependencyGraph, ProcessingOrder};
