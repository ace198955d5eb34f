//! Durable per-phase result files
//!
//! The whole result list is rewritten after every arrival. Each write goes
//! to a sibling temp file that is then renamed over the target, so the file
//! on disk is a complete JSON array at every point in time.

use super::types::{EngineError, EngineResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Run-scoped result list mirrored to a JSON file
#[derive(Debug)]
pub struct ResultStore<R> {
    path: PathBuf,
    results: Vec<R>,
}

impl<R: Serialize> ResultStore<R> {
    /// Create the store and write an empty array to `path`
    pub fn create(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }

        let store = Self {
            path,
            results: Vec::new(),
        };
        store.flush()?;
        Ok(store)
    }

    /// Record one result and rewrite the file
    pub fn append(&mut self, result: R) -> EngineResult<()> {
        self.results.push(result);
        self.flush()
    }

    fn flush(&self) -> EngineResult<()> {
        let bytes = serde_json::to_vec_pretty(&self.results)?;
        let tmp = self.path.with_extension("json.tmp");

        std::fs::write(&tmp, bytes).map_err(|e| EngineError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| EngineError::io(&self.path, e))?;

        debug!(path = %self.path.display(), count = self.results.len(), "result file rewritten");
        Ok(())
    }
}

impl<R> ResultStore<R> {
    /// Results received so far, in arrival order
    pub fn results(&self) -> &[R] {
        &self.results
    }

    /// Number of results received so far
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no result has arrived yet
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Location of the result file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the collected results
    pub fn into_results(self) -> Vec<R> {
        self.results
    }
}

impl<R: DeserializeOwned> ResultStore<R> {
    /// Read a result file written by a previous run
    pub fn load(path: &Path) -> EngineResult<Vec<R>> {
        let bytes = std::fs::read(path).map_err(|e| EngineError::io(path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::{Cost, JobResult, Outcome, Phase};
    use tempfile::TempDir;

    fn result(name: &str) -> JobResult {
        JobResult::failure(Phase::Install, name, Outcome::ToolchainFailed, "exit 1", Cost::ElapsedMs(5))
    }

    #[test]
    fn test_create_writes_empty_array() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("results").join("install.json");

        let store = ResultStore::<JobResult>::create(&path).unwrap();
        assert!(store.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn test_every_append_leaves_a_valid_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("install.json");
        let mut store = ResultStore::create(&path).unwrap();

        for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
            store.append(result(name)).unwrap();
            let on_disk: Vec<JobResult> = ResultStore::load(&path).unwrap();
            assert_eq!(on_disk.len(), i + 1);
            assert_eq!(on_disk[i].package, name);
        }

        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(store.into_results().len(), 3);
    }

    #[test]
    fn test_unwritable_location_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let err = ResultStore::<JobResult>::create(blocker.join("results.json")).unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ResultStore::<JobResult>::load(Path::new("/nonexistent/results.json")).unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
