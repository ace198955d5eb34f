//! Pipeline run with the default relative work directory
//!
//! Changes the process working directory, so this file holds a single test.

use async_trait::async_trait;
use pkgflow_core::toolchain::ToolchainResult;
use pkgflow_core::transport::TransportResult;
use pkgflow_core::{
    Invocation, Lockfile, Outcome, Phase, Pipeline, PipelineConfig, SourceTransport, ToolOutput,
    Toolchain,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct ArchiveServer;

#[async_trait]
impl SourceTransport for ArchiveServer {
    async fn fetch_archive(&self, _url: &str, dest: &Path) -> TransportResult<u64> {
        std::fs::write(dest, b"archive").unwrap();
        Ok(7)
    }

    async fn clone_repo(&self, _url: &str, _reference: Option<&str>, _dest: &Path) -> TransportResult<()> {
        unreachable!("only repository packages in this lockfile")
    }
}

/// Fails unless every path it is given resolves from its working directory
struct PathChecking;

#[async_trait]
impl Toolchain for PathChecking {
    async fn invoke(&self, invocation: &Invocation) -> ToolchainResult<ToolOutput> {
        let here = invocation
            .workdir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap());

        let mut missing = Vec::new();
        if !here.join(&invocation.artifact).exists() {
            missing.push(invocation.artifact.display().to_string());
        }
        for (_, value) in &invocation.env {
            if !here.join(value).exists() {
                missing.push(value.clone());
            }
        }

        let output = if missing.is_empty() {
            "* checking examples ... OK\n* DONE\n".to_string()
        } else {
            format!("missing {} from {}\n", missing.join(", "), here.display())
        };
        Ok(ToolOutput {
            success: missing.is_empty(),
            exit_code: Some(i32::from(!missing.is_empty())),
            output,
        })
    }
}

#[tokio::test]
async fn test_check_resolves_paths_from_package_workdir() {
    let tmp = TempDir::new().unwrap();
    std::env::set_current_dir(tmp.path()).unwrap();

    let lockfile = Lockfile::from_json(
        r#"{"Packages": {
            "teal": {"Package": "teal", "Version": "0.1", "Source": "Repository", "Repository": "CRAN"}
        }}"#,
    )
    .unwrap();
    let config = PipelineConfig {
        check_selection: "teal".to_string(),
        poll_interval_ms: 10,
        progress_interval_secs: 0,
        ..PipelineConfig::default()
    };
    assert!(config.work_dir.is_relative());

    let pipeline = Pipeline::new(config, Arc::new(ArchiveServer), Arc::new(PathChecking)).unwrap();
    assert!(pipeline.config().work_dir.is_absolute());

    let report = pipeline.run(&lockfile).await.unwrap();
    let teal = &report.summary.packages["teal"];
    assert_eq!(teal.install, Some(Outcome::Success));
    assert_eq!(teal.check, Some(Outcome::Success));
    assert!(!report.summary.should_fail);
    assert!(
        tmp.path()
            .join("pkgflow-work/results")
            .join(format!("{}.json", Phase::Check))
            .exists()
    );
}
