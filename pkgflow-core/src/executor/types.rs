//! Job and result types shared by every pipeline phase

use crate::log_parser::{Finding, ParsedLog};
use crate::severity::Severity;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Pipeline phase a job belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Fetch the source artifact
    Download,
    /// Build and install into the library
    Install,
    /// Run the toolchain's verification mode
    Check,
}

impl Phase {
    /// Lower-case name, used for directories and file names
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Install => "install",
            Self::Check => "check",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of job outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Job completed successfully
    Success,
    /// Version absent from the source repository
    NotFound,
    /// Checkout from GitHub failed
    GithubCloneFailed,
    /// Checkout from GitLab failed
    GitlabCloneFailed,
    /// Any other transfer problem
    NetworkFailure,
    /// The external toolchain reported failure
    ToolchainFailed,
}

impl Outcome {
    /// Whether this is the success outcome
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "✅ SUCCESS"),
            Self::NotFound => write!(f, "🔍 NOT FOUND"),
            Self::GithubCloneFailed => write!(f, "❌ GITHUB CLONE FAILED"),
            Self::GitlabCloneFailed => write!(f, "❌ GITLAB CLONE FAILED"),
            Self::NetworkFailure => write!(f, "🌐 NETWORK FAILURE"),
            Self::ToolchainFailed => write!(f, "❌ FAILED"),
        }
    }
}

/// Resource cost of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cost {
    /// Bytes transferred
    Bytes(u64),
    /// Wall-clock time
    ElapsedMs(u64),
}

impl Cost {
    /// Elapsed-time cost from a duration
    pub fn elapsed(duration: Duration) -> Self {
        Self::ElapsedMs(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => write!(f, "{:.1} KB", *b as f64 / 1024.0),
            Self::ElapsedMs(ms) => write!(f, "{:.2}s", *ms as f64 / 1000.0),
        }
    }
}

/// Classified check output for one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageOutcome {
    /// Most severe finding
    pub severity: Severity,
    /// Forced by the fail-override pattern
    pub should_fail: bool,
    /// Findings in order of appearance
    pub findings: Vec<Finding>,
    /// Check duration
    pub elapsed_ms: u64,
}

impl PackageOutcome {
    /// Combine parser output with the measured duration
    pub fn from_parsed(parsed: ParsedLog, elapsed: Duration) -> Self {
        Self {
            severity: parsed.severity,
            should_fail: parsed.should_fail,
            findings: parsed.findings,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Whether the check counts as failed
    pub fn failed(&self) -> bool {
        self.should_fail || self.severity.fails()
    }
}

/// Result of one job, the same shape for every phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Package name
    pub package: String,
    /// Phase that produced the result
    pub phase: Phase,
    /// Outcome code
    pub outcome: Outcome,
    /// Human-readable message
    pub message: String,
    /// Bytes transferred or time spent
    pub cost: Cost,
    /// Output artifact, `None` on failure
    pub artifact: Option<PathBuf>,
    /// Per-package log file, if one was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<PathBuf>,
    /// Classified check output (check phase only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<PackageOutcome>,
}

impl JobResult {
    /// Successful result with an artifact
    pub fn success(
        phase: Phase,
        package: impl Into<String>,
        message: impl Into<String>,
        cost: Cost,
        artifact: PathBuf,
    ) -> Self {
        Self {
            package: package.into(),
            phase,
            outcome: Outcome::Success,
            message: message.into(),
            cost,
            artifact: Some(artifact),
            log: None,
            check: None,
        }
    }

    /// Failed result, without artifact
    pub fn failure(
        phase: Phase,
        package: impl Into<String>,
        outcome: Outcome,
        message: impl Into<String>,
        cost: Cost,
    ) -> Self {
        Self {
            package: package.into(),
            phase,
            outcome,
            message: message.into(),
            cost,
            artifact: None,
            log: None,
            check: None,
        }
    }

    /// Attach the per-package log path
    #[must_use]
    pub fn with_log(mut self, log: PathBuf) -> Self {
        self.log = Some(log);
        self
    }

    /// Attach classified check output
    #[must_use]
    pub fn with_check(mut self, check: PackageOutcome) -> Self {
        self.check = Some(check);
        self
    }

    /// Human-readable one-liner
    pub fn status_line(&self) -> String {
        format!(
            "{:10} {:24} {:28} {}",
            self.phase.as_str(),
            self.package,
            self.outcome.to_string(),
            self.cost
        )
    }
}

/// What the aggregator needs from a phase result
pub trait JobReport {
    /// Package the result belongs to
    fn package(&self) -> &str;
    /// Whether the job succeeded
    fn succeeded(&self) -> bool;
    /// Human-readable message
    fn message(&self) -> &str;
}

impl JobReport for JobResult {
    fn package(&self) -> &str {
        &self.package
    }

    fn succeeded(&self) -> bool {
        self.outcome.is_success() && !self.check.as_ref().is_some_and(PackageOutcome::failed)
    }

    fn message(&self) -> &str {
        &self.message
    }
}

/// Engine-fatal bookkeeping errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl EngineError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for engine bookkeeping
pub type EngineResult<T> = Result<T, EngineError>;

/// One unit of work: a package and the future that produces its result.
///
/// The future only returns `Err` for bookkeeping failures (log files);
/// job-level failures are `Ok` results with a failure outcome.
pub struct PhaseJob<R> {
    /// Package the job works on
    pub package: String,
    /// The operation itself
    pub job: BoxFuture<'static, EngineResult<R>>,
}

impl<R> PhaseJob<R> {
    /// Wrap a future as a job
    pub fn new<F>(package: impl Into<String>, job: F) -> Self
    where
        F: std::future::Future<Output = EngineResult<R>> + Send + 'static,
    {
        Self {
            package: package.into(),
            job: Box::pin(job),
        }
    }
}

impl<R> fmt::Debug for PhaseJob<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseJob").field("package", &self.package).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serialization_skips_empty_fields() {
        let result = JobResult::failure(
            Phase::Download,
            "teal",
            Outcome::NotFound,
            "not in repository",
            Cost::Bytes(0),
        );
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["phase"], "download");
        assert_eq!(json["outcome"], "not_found");
        assert_eq!(json["cost"]["bytes"], 0);
        assert!(json["artifact"].is_null());
        assert!(json.get("check").is_none());
        assert!(json.get("log").is_none());
    }

    #[test]
    fn test_check_failure_marks_result_failed() {
        let check = PackageOutcome {
            severity: Severity::Warning,
            should_fail: true,
            findings: vec![],
            elapsed_ms: 10,
        };
        let result = JobResult::success(
            Phase::Check,
            "teal",
            "checked",
            Cost::ElapsedMs(10),
            PathBuf::from("/tmp/teal.Rcheck"),
        )
        .with_check(check);

        assert_eq!(result.outcome, Outcome::Success);
        assert!(!result.succeeded());
    }

    #[test]
    fn test_cost_display() {
        assert_eq!(Cost::Bytes(2048).to_string(), "2.0 KB");
        assert_eq!(Cost::elapsed(Duration::from_millis(1500)).to_string(), "1.50s");
    }

    #[test]
    fn test_round_trip_with_check() {
        let result = JobResult::success(Phase::Check, "a", "ok", Cost::ElapsedMs(1), PathBuf::from("x"))
            .with_log(PathBuf::from("logs/check/a.log"))
            .with_check(PackageOutcome {
                severity: Severity::Note,
                should_fail: false,
                findings: vec![Finding {
                    severity: Severity::Note,
                    text: "* checking x ... NOTE\n".to_string(),
                }],
                elapsed_ms: 1,
            });

        let json = serde_json::to_string(&result).unwrap();
        let back: JobResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
