//! Phase execution engine
//!
//! One engine instance per pipeline phase fans out per-package jobs under a
//! concurrency ceiling and aggregates their results into a durable file:
//! - `types`: job and result shapes shared by all phases
//! - `engine`: admission control, dispatch and aggregation
//! - `result_store`: crash-safe result file
//! - `monitor`: in-flight tracking, progress sampler, phase statistics

pub mod types;
pub mod engine;
pub mod result_store;
pub mod monitor;

pub use types::{
    Phase, Outcome, Cost, JobResult, PackageOutcome, JobReport, PhaseJob,
    EngineError, EngineResult,
};
pub use engine::{TaskEngine, EngineConfig, PhaseRun, DEFAULT_IDLE_TIMEOUT, DEFAULT_POLL_INTERVAL};
pub use result_store::ResultStore;
pub use monitor::{JobMonitor, PhaseStats};
