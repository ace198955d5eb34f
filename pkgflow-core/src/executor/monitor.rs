//! In-flight job tracking, progress sampling and phase statistics

use super::types::{Cost, JobReport, JobResult, Phase};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{Instrument, info};

/// Shortest sampler period; `tokio::time::interval` rejects zero
const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

struct Running {
    started: Instant,
    reported: u32,
}

/// Tracks which jobs are running and since when
#[derive(Clone, Default)]
pub struct JobMonitor {
    inner: Arc<Mutex<HashMap<String, Running>>>,
}

impl JobMonitor {
    /// Create an empty monitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a job as started
    pub fn started(&self, package: &str) {
        self.inner.lock().insert(
            package.to_string(),
            Running {
                started: Instant::now(),
                reported: 0,
            },
        );
    }

    /// Mark a job as finished
    pub fn finished(&self, package: &str) {
        self.inner.lock().remove(package);
    }

    /// Number of jobs currently running
    pub fn in_flight(&self) -> usize {
        self.inner.lock().len()
    }

    /// Jobs whose elapsed time crossed a multiple of `interval` that has not
    /// been reported yet, sorted by package name.
    ///
    /// Each multiple is returned once per job.
    pub fn overdue(&self, interval: Duration) -> Vec<(String, Duration)> {
        if interval.is_zero() {
            return Vec::new();
        }

        let mut due = Vec::new();
        let mut running = self.inner.lock();
        for (package, job) in running.iter_mut() {
            let elapsed = job.started.elapsed();
            let multiple = u32::try_from(elapsed.as_nanos() / interval.as_nanos()).unwrap_or(u32::MAX);
            if multiple > job.reported {
                job.reported = multiple;
                due.push((package.clone(), elapsed));
            }
        }
        drop(running);

        due.sort_by(|a, b| a.0.cmp(&b.0));
        due
    }

    /// Spawn the low-priority sampler that logs long-running jobs.
    ///
    /// The sampler only reads the monitor; abort the handle to stop it.
    pub fn spawn_sampler(&self, phase: Phase, interval: Duration) -> JoinHandle<()> {
        let interval = interval.max(MIN_SAMPLE_INTERVAL);
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                for (package, elapsed) in monitor.overdue(interval) {
                    info!(
                        phase = %phase,
                        package = %package,
                        elapsed_secs = elapsed.as_secs(),
                        "still running"
                    );
                }
            }
        }
        .in_current_span())
    }
}

impl std::fmt::Debug for JobMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobMonitor").field("in_flight", &self.in_flight()).finish()
    }
}

/// Aggregate numbers for one phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub phase: Option<Phase>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub bytes_transferred: u64,
    pub total_duration_ms: u64,
    pub avg_duration_ms: f64,
    pub slowest_package: Option<String>,
    pub slowest_duration_ms: Option<u64>,
}

impl PhaseStats {
    /// Compute statistics from a phase's results
    pub fn from_results(phase: Phase, results: &[JobResult]) -> Self {
        let mut stats = Self {
            phase: Some(phase),
            total: results.len(),
            ..Self::default()
        };
        let mut timed = 0usize;

        for result in results {
            if result.succeeded() {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }

            match result.cost {
                Cost::Bytes(bytes) => stats.bytes_transferred += bytes,
                Cost::ElapsedMs(ms) => {
                    timed += 1;
                    stats.total_duration_ms += ms;
                    if stats.slowest_duration_ms.is_none_or(|slowest| ms > slowest) {
                        stats.slowest_duration_ms = Some(ms);
                        stats.slowest_package = Some(result.package.clone());
                    }
                }
            }
        }

        if timed > 0 {
            stats.avg_duration_ms = stats.total_duration_ms as f64 / timed as f64;
        }
        stats
    }
}

impl std::fmt::Display for PhaseStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.phase {
            Some(phase) => writeln!(f, "Phase: {phase}")?,
            None => writeln!(f, "Phase")?,
        }
        writeln!(f, "───────────────────────────────────")?;
        writeln!(f, "Total packages:  {}", self.total)?;
        writeln!(f, "  ✅ Succeeded:  {}", self.succeeded)?;
        writeln!(f, "  ❌ Failed:     {}", self.failed)?;
        if self.bytes_transferred > 0 {
            writeln!(f, "Transferred:     {:.1} KB", self.bytes_transferred as f64 / 1024.0)?;
        }
        if self.total_duration_ms > 0 {
            writeln!(f, "Total time:      {:.2}s", self.total_duration_ms as f64 / 1000.0)?;
            writeln!(f, "Avg job time:    {:.2}s", self.avg_duration_ms / 1000.0)?;
        }
        if let Some(ref slowest) = self.slowest_package {
            writeln!(f, "Slowest package: {slowest}")?;
            if let Some(ms) = self.slowest_duration_ms {
                writeln!(f, "  Duration:      {:.2}s", ms as f64 / 1000.0)?;
            }
        }
        Ok(())
    }
}
