//! Full pipeline run

use super::CommandError;
use pkgflow_core::{Lockfile, Pipeline, PipelineConfig};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Command-line values that take precedence over the configuration file
#[derive(Debug, Default)]
pub struct Overrides {
    pub work_dir: Option<PathBuf>,
    pub download_jobs: Option<usize>,
    pub install_jobs: Option<usize>,
    pub check_jobs: Option<usize>,
    pub select: Option<String>,
    pub check_all: bool,
    pub fail_on: Option<String>,
    pub html_logs: bool,
}

impl Overrides {
    /// Apply the flags that were given
    pub fn apply(self, config: &mut PipelineConfig) {
        if let Some(dir) = self.work_dir {
            config.work_dir = dir;
        }
        if let Some(n) = self.download_jobs {
            config.download_jobs = n;
        }
        if let Some(n) = self.install_jobs {
            config.install_jobs = n;
        }
        if let Some(n) = self.check_jobs {
            config.check_jobs = n;
        }
        if let Some(expr) = self.select {
            config.check_selection = expr;
        }
        if self.check_all {
            config.check_all = true;
        }
        if self.fail_on.is_some() {
            config.fail_on = self.fail_on;
        }
        if self.html_logs {
            config.html_logs = true;
        }
    }
}

/// Run every phase; returns whether the run should be reported as failed
pub async fn execute(
    lockfile: &Path,
    config_file: Option<&Path>,
    overrides: Overrides,
) -> Result<bool, CommandError> {
    let mut config = match config_file {
        Some(path) => PipelineConfig::from_yaml_file(path)?,
        None => PipelineConfig::default(),
    };
    overrides.apply(&mut config);

    let lock = Lockfile::from_path(lockfile)?;
    tracing::info!(
        lockfile = %lockfile.display(),
        packages = lock.packages.len(),
        "Loaded lockfile"
    );

    let start = Instant::now();
    let pipeline = Pipeline::from_config(config)?;
    let report = pipeline.run(&lock).await?;

    println!("{}", report.summary);
    for run in report.runs.iter().filter(|run| !run.complete()) {
        println!(
            "⚠️  {} phase gave up after idle timeout: {}/{} results",
            run.phase, run.received, run.expected
        );
    }
    println!(
        "Finished in {:.1}s, summary written to {}",
        start.elapsed().as_secs_f64(),
        pipeline.config().summary_path().display()
    );

    Ok(report.summary.should_fail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let mut config = PipelineConfig::from_yaml_str("download_jobs: 2\ncheck_selection: teal\n").unwrap();
        Overrides {
            work_dir: Some(PathBuf::from("/tmp/flow")),
            check_jobs: Some(3),
            select: Some("rtables".to_string()),
            fail_on: Some("no visible binding".to_string()),
            ..Overrides::default()
        }
        .apply(&mut config);

        assert_eq!(config.work_dir, PathBuf::from("/tmp/flow"));
        assert_eq!(config.download_jobs, 2);
        assert_eq!(config.check_jobs, 3);
        assert_eq!(config.check_selection, "rtables");
        assert_eq!(config.fail_on.as_deref(), Some("no visible binding"));
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let mut config = PipelineConfig::from_yaml_str("check_all: false\nhtml_logs: true\n").unwrap();
        Overrides::default().apply(&mut config);

        assert!(!config.check_all);
        assert!(config.html_logs);
        assert_eq!(config.install_jobs, 1);
    }
}
