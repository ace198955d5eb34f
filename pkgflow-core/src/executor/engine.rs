//! Bounded fan-out of per-package jobs with a single result aggregator
//!
//! A dispatcher task admits jobs through a semaphore with `concurrency`
//! permits. Each job holds its permit until its result has been handed to
//! the aggregator over a bounded channel. The aggregator drains the channel
//! until every job has reported or no result arrived for `idle_timeout`,
//! and rewrites the phase's result file after every arrival.

use super::monitor::JobMonitor;
use super::result_store::ResultStore;
use super::types::{EngineResult, JobReport, Phase, PhaseJob};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

/// Default wait without any arrival before a phase soft-finishes
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default granularity of the aggregator's wait
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Settings for one phase run
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Phase the jobs belong to, used in logs
    pub phase: Phase,
    /// Maximum number of jobs in flight
    pub concurrency: usize,
    /// Give up waiting after this long without an arrival
    pub idle_timeout: Duration,
    /// Length of a single wait for the next result
    pub poll_interval: Duration,
    /// Log jobs running longer than each multiple of this interval
    pub progress_interval: Option<Duration>,
}

impl EngineConfig {
    /// Settings with default timeouts and no progress sampler
    pub fn new(phase: Phase, concurrency: usize) -> Self {
        Self {
            phase,
            concurrency,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            progress_interval: None,
        }
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Enable the progress sampler; a zero interval leaves it disabled
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = (!interval.is_zero()).then_some(interval);
        self
    }
}

/// Summary of one phase run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseRun {
    pub phase: Phase,
    /// Number of submitted jobs
    pub expected: usize,
    /// Number of aggregated results
    pub received: usize,
    /// The idle timeout ended the run before every job reported
    pub soft_finished: bool,
    pub elapsed: Duration,
}

impl PhaseRun {
    /// Whether every submitted job reported
    pub fn complete(&self) -> bool {
        self.received == self.expected
    }
}

/// Aborts a background task when dropped
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs the jobs of one phase
#[derive(Debug)]
pub struct TaskEngine {
    config: EngineConfig,
    monitor: JobMonitor,
}

impl TaskEngine {
    /// Create an engine; a concurrency of zero is raised to one
    pub fn new(mut config: EngineConfig) -> Self {
        config.concurrency = config.concurrency.max(1);
        Self {
            config,
            monitor: JobMonitor::new(),
        }
    }

    /// Settings in effect
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Monitor of the jobs currently in flight
    pub fn monitor(&self) -> &JobMonitor {
        &self.monitor
    }

    /// Run all jobs and aggregate their results into `store`.
    ///
    /// Job failures are results like any other. Only bookkeeping failures,
    /// from the store or reported by a job, end the run with an error.
    pub async fn run<R>(&self, jobs: Vec<PhaseJob<R>>, store: &mut ResultStore<R>) -> EngineResult<PhaseRun>
    where
        R: JobReport + Serialize + Send + 'static,
    {
        let phase = self.config.phase;
        let expected = jobs.len();
        let start = Instant::now();

        info!(
            phase = %phase,
            jobs = expected,
            concurrency = self.config.concurrency,
            "Starting phase"
        );

        let (tx, mut rx) = mpsc::channel::<EngineResult<R>>(self.config.concurrency);
        let _dispatcher = AbortOnDrop(self.spawn_dispatcher(jobs, tx));
        let _sampler = self
            .config
            .progress_interval
            .map(|interval| AbortOnDrop(self.monitor.spawn_sampler(phase, interval)));

        let mut received = 0usize;
        let mut soft_finished = false;
        let mut idle = Duration::ZERO;

        while received < expected {
            match tokio::time::timeout(self.config.poll_interval, rx.recv()).await {
                Ok(Some(result)) => {
                    let result = result?;
                    idle = Duration::ZERO;
                    received += 1;

                    if result.succeeded() {
                        info!(
                            phase = %phase,
                            package = result.package(),
                            received,
                            expected,
                            "{}",
                            result.message()
                        );
                    } else {
                        warn!(
                            phase = %phase,
                            package = result.package(),
                            received,
                            expected,
                            "{}",
                            result.message()
                        );
                    }
                    store.append(result)?;
                }
                Ok(None) => {
                    warn!(phase = %phase, received, expected, "All jobs gone before reporting");
                    break;
                }
                Err(_) => {
                    idle += self.config.poll_interval;
                    debug!(
                        phase = %phase,
                        idle_ms = idle.as_millis() as u64,
                        in_flight = self.monitor.in_flight(),
                        "waiting for results"
                    );
                    if idle >= self.config.idle_timeout {
                        warn!(
                            phase = %phase,
                            received,
                            expected,
                            idle_secs = idle.as_secs(),
                            "No results within idle timeout, finishing phase early"
                        );
                        soft_finished = true;
                        break;
                    }
                }
            }
        }

        let run = PhaseRun {
            phase,
            expected,
            received,
            soft_finished,
            elapsed: start.elapsed(),
        };
        info!(
            phase = %phase,
            received,
            expected,
            elapsed_ms = run.elapsed.as_millis() as u64,
            "Phase finished"
        );
        Ok(run)
    }

    fn spawn_dispatcher<R>(&self, jobs: Vec<PhaseJob<R>>, tx: mpsc::Sender<EngineResult<R>>) -> JoinHandle<()>
    where
        R: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let monitor = self.monitor.clone();

        tokio::spawn(
            async move {
                for PhaseJob { package, job } in jobs {
                    // The semaphore is never closed
                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                        break;
                    };
                    let tx = tx.clone();
                    let monitor = monitor.clone();

                    tokio::spawn(
                        async move {
                            monitor.started(&package);
                            let result = job.await;
                            monitor.finished(&package);
                            // The aggregator may have soft-finished already
                            if tx.send(result).await.is_err() {
                                debug!(package = %package, "result dropped, aggregator gone");
                            }
                            drop(permit);
                        }
                        .in_current_span(),
                    );
                }
            }
            .in_current_span(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::{Cost, EngineError, JobResult, Outcome};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn ok_job(name: &str, delay_ms: u64) -> PhaseJob<JobResult> {
        let package = name.to_string();
        PhaseJob::new(name, async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(JobResult::success(
                Phase::Install,
                package.clone(),
                "installed",
                Cost::ElapsedMs(delay_ms),
                PathBuf::from("lib").join(&package),
            ))
        })
    }

    #[tokio::test]
    async fn test_zero_progress_interval_disables_sampler() {
        let config = EngineConfig::new(Phase::Check, 2).with_progress_interval(Duration::ZERO);
        assert_eq!(config.progress_interval, None);

        let tmp = TempDir::new().unwrap();
        let mut store = ResultStore::create(tmp.path().join("check.json")).unwrap();
        let run = TaskEngine::new(config)
            .run(vec![ok_job("a", 1)], &mut store)
            .await
            .unwrap();
        assert!(run.complete());
    }

    #[tokio::test]
    async fn test_failures_are_results() {
        let tmp = TempDir::new().unwrap();
        let mut store = ResultStore::create(tmp.path().join("install.json")).unwrap();
        let jobs = vec![
            ok_job("a", 5),
            PhaseJob::new("b", async {
                Ok(JobResult::failure(Phase::Install, "b", Outcome::ToolchainFailed, "exit 1", Cost::ElapsedMs(1)))
            }),
        ];

        let engine = TaskEngine::new(EngineConfig::new(Phase::Install, 2));
        let run = engine.run(jobs, &mut store).await.unwrap();

        assert!(run.complete());
        assert!(!run.soft_finished);
        let mut names: Vec<_> = store.results().iter().map(|r| r.package.clone()).collect();
        names.sort();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(engine.monitor().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_single_permit_preserves_submission_order() {
        let tmp = TempDir::new().unwrap();
        let mut store = ResultStore::create(tmp.path().join("install.json")).unwrap();
        let jobs = vec![ok_job("c", 20), ok_job("b", 1), ok_job("a", 10)];

        let engine = TaskEngine::new(EngineConfig::new(Phase::Install, 1));
        engine.run(jobs, &mut store).await.unwrap();

        let names: Vec<_> = store.results().iter().map(|r| r.package.as_str()).collect();
        assert_eq!(names, ["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_empty_job_list() {
        let tmp = TempDir::new().unwrap();
        let mut store = ResultStore::<JobResult>::create(tmp.path().join("check.json")).unwrap();

        let run = TaskEngine::new(EngineConfig::new(Phase::Check, 4))
            .run(Vec::new(), &mut store)
            .await
            .unwrap();
        assert_eq!(run.expected, 0);
        assert!(run.complete());
    }

    #[tokio::test]
    async fn test_bookkeeping_error_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let mut store = ResultStore::create(tmp.path().join("install.json")).unwrap();
        let jobs = vec![PhaseJob::new("a", async {
            Err::<JobResult, _>(EngineError::io(
                "/logs/install/a.log",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ))
        })];

        let err = TaskEngine::new(EngineConfig::new(Phase::Install, 1))
            .run(jobs, &mut store)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_idle_timeout_soft_finishes() {
        let tmp = TempDir::new().unwrap();
        let mut store = ResultStore::create(tmp.path().join("check.json")).unwrap();
        let jobs = vec![
            ok_job("fast", 1),
            PhaseJob::new("stuck", futures::future::pending()),
        ];

        let config = EngineConfig::new(Phase::Check, 2)
            .with_idle_timeout(Duration::from_millis(100))
            .with_poll_interval(Duration::from_millis(20));
        let run = TaskEngine::new(config).run(jobs, &mut store).await.unwrap();

        assert!(run.soft_finished);
        assert_eq!(run.received, 1);
        assert_eq!(store.results()[0].package, "fast");
        assert!(logs_contain("finishing phase early"));
    }
}
