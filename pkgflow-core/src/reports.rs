//! Run summary handed to the report renderer

use crate::executor::{EngineError, EngineResult, JobReport, JobResult, Outcome, Phase, PhaseStats};
use crate::severity::Severity;
use pkgflow_graph::ProcessingOrder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Failed,
    Partial,
}

/// Final state of one package across phases
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSummary {
    pub download: Option<Outcome>,
    pub install: Option<Outcome>,
    pub check: Option<Outcome>,
    /// Most severe check finding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Any phase result for this package failed
    pub failed: bool,
}

/// Everything the report renderer needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: String,
    pub status: RunStatus,
    /// Fingerprint of the dependency graph the order was computed from
    #[serde(default)]
    pub graph_fingerprint: String,
    pub order: ProcessingOrder,
    #[serde(default)]
    pub cycles: Vec<Vec<String>>,
    pub phases: Vec<PhaseStats>,
    pub packages: BTreeMap<String, PackageSummary>,
    pub should_fail: bool,
}

impl RunSummary {
    /// Combine the results of every phase that ran
    pub fn from_phases(order: ProcessingOrder, phases: &[(Phase, &[JobResult])]) -> Self {
        let mut packages: BTreeMap<String, PackageSummary> = order
            .iter()
            .map(|name| (name.to_string(), PackageSummary::default()))
            .collect();

        for (phase, results) in phases {
            for result in *results {
                let entry = packages.entry(result.package.clone()).or_default();
                match phase {
                    Phase::Download => entry.download = Some(result.outcome),
                    Phase::Install => entry.install = Some(result.outcome),
                    Phase::Check => {
                        entry.check = Some(result.outcome);
                        entry.severity = result.check.as_ref().map(|c| c.severity);
                    }
                }
                if !result.succeeded() {
                    entry.failed = true;
                }
            }
        }

        let should_fail = packages.values().any(|p| p.failed);
        let any_success = phases
            .iter()
            .any(|(_, results)| results.iter().any(JobReport::succeeded));
        let status = match (should_fail, any_success) {
            (false, _) => RunStatus::Success,
            (true, true) => RunStatus::Partial,
            (true, false) => RunStatus::Failed,
        };

        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            status,
            graph_fingerprint: String::new(),
            order,
            cycles: Vec::new(),
            phases: phases
                .iter()
                .map(|(phase, results)| PhaseStats::from_results(*phase, results))
                .collect(),
            packages,
            should_fail,
        }
    }

    /// Attach the dependency-graph diagnostics
    #[must_use]
    pub fn with_graph(mut self, fingerprint: String, cycles: Vec<Vec<String>>) -> Self {
        self.graph_fingerprint = fingerprint;
        self.cycles = cycles;
        self
    }

    /// Packages with at least one failed phase, in processing order
    pub fn failed_packages(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|name| self.packages.get(*name).is_some_and(|p| p.failed))
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the summary, replacing any previous one
    pub fn write(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, self.to_json()?).map_err(|e| EngineError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| EngineError::io(path, e))?;
        Ok(())
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Run status: {:?}", self.status)?;
        writeln!(f)?;
        for stats in &self.phases {
            writeln!(f, "{stats}")?;
        }
        let failed = self.failed_packages();
        if !failed.is_empty() {
            writeln!(f, "Failed packages: {}", failed.join(", "))?;
        }
        if !self.cycles.is_empty() {
            writeln!(f, "Dependency cycles: {}", self.cycles.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Cost, PackageOutcome};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn order(names: &[&str]) -> ProcessingOrder {
        pkgflow_graph::resolve(names.iter().map(|n| (n.to_string(), Vec::<String>::new())))
    }

    fn ok(phase: Phase, name: &str) -> JobResult {
        JobResult::success(phase, name, "ok", Cost::ElapsedMs(1), PathBuf::from(name))
    }

    #[test]
    fn test_summary_tracks_each_phase() {
        let downloads = vec![
            ok(Phase::Download, "a"),
            ok(Phase::Download, "b"),
            JobResult::failure(Phase::Download, "c", Outcome::NotFound, "404", Cost::Bytes(0)),
        ];
        let installs = vec![ok(Phase::Install, "a"), ok(Phase::Install, "b")];
        let checks = vec![ok(Phase::Check, "a").with_check(PackageOutcome {
            severity: Severity::Note,
            should_fail: false,
            findings: vec![],
            elapsed_ms: 1,
        })];

        let summary = RunSummary::from_phases(
            order(&["a", "b", "c"]),
            &[
                (Phase::Download, &downloads[..]),
                (Phase::Install, &installs[..]),
                (Phase::Check, &checks[..]),
            ],
        );

        assert_eq!(summary.status, RunStatus::Partial);
        assert!(summary.should_fail);
        assert_eq!(summary.failed_packages(), ["c"]);
        assert_eq!(summary.packages["a"].severity, Some(Severity::Note));
        assert_eq!(summary.packages["b"].check, None);
        assert_eq!(summary.packages["c"].download, Some(Outcome::NotFound));
        assert_eq!(summary.phases.len(), 3);
        assert_eq!(summary.phases[0].failed, 1);
    }

    #[test]
    fn test_all_good_run() {
        let downloads = vec![ok(Phase::Download, "a")];
        let summary = RunSummary::from_phases(order(&["a"]), &[(Phase::Download, &downloads[..])]);

        assert_eq!(summary.status, RunStatus::Success);
        assert!(!summary.should_fail);
        assert!(summary.to_string().contains("Run status: Success"));
    }

    #[test]
    fn test_write_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("summary.json");
        let downloads = vec![JobResult::failure(Phase::Download, "a", Outcome::NetworkFailure, "timeout", Cost::Bytes(0))];

        let summary = RunSummary::from_phases(order(&["a"]), &[(Phase::Download, &downloads[..])])
            .with_graph("abc".to_string(), vec![vec!["x".to_string(), "y".to_string()]]);
        summary.write(&path).unwrap();

        let back: RunSummary = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.status, RunStatus::Failed);
        assert_eq!(back.cycles.len(), 1);
        assert_eq!(back.graph_fingerprint, "abc");
        assert_eq!(back.order.as_slice(), ["a"]);
    }
}
