//! Read-only lockfile model
//!
//! Only the fields the pipeline consumes are modelled; unknown fields are
//! ignored and no schema validation happens here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Repository name used when a package names none
pub const DEFAULT_REPOSITORY: &str = "CRAN";

/// Errors raised while reading a lockfile
#[derive(Debug, Error)]
pub enum LockfileError {
    #[error("Failed to read lockfile {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid lockfile: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for lockfile operations
pub type LockfileResult<T> = Result<T, LockfileError>;

/// Where a locked package comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Archive hosted by a package repository
    Repository,
    /// Checkout from GitHub
    GitHub,
    /// Checkout from GitLab
    GitLab,
    /// Local path
    Local,
    /// Anything the pipeline cannot fetch
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Repository => "repository",
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Local => "local",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One pinned package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LockedPackage {
    pub package: String,
    pub version: String,
    pub source: SourceKind,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub remote_host: Option<String>,
    #[serde(default)]
    pub remote_username: Option<String>,
    #[serde(default)]
    pub remote_repo: Option<String>,
    #[serde(default)]
    pub remote_ref: Option<String>,
    #[serde(default)]
    pub remote_sha: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl LockedPackage {
    /// File name of the source archive, `<name>_<version>.tar.gz`
    pub fn archive_name(&self) -> String {
        format!("{}_{}.tar.gz", self.package, self.version)
    }

    /// Clone URL for version-controlled sources
    pub fn clone_url(&self) -> Option<String> {
        let user = self.remote_username.as_deref()?;
        let repo = self.remote_repo.as_deref()?;
        let host = match (self.source, self.remote_host.as_deref()) {
            // The GitHub API host is recorded, not the web host
            (SourceKind::GitHub, None | Some("api.github.com")) => "github.com",
            (SourceKind::GitLab, None) => "gitlab.com",
            (_, Some(host)) => host,
            (_, None) => return None,
        };
        Some(format!("https://{host}/{user}/{repo}.git"))
    }

    /// Revision to check out: the pinned commit if any, else the ref
    pub fn checkout_ref(&self) -> Option<&str> {
        self.remote_sha.as_deref().or(self.remote_ref.as_deref())
    }
}

/// Repository declared in the lockfile header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RepositoryEntry {
    pub name: String,
    #[serde(rename = "URL")]
    pub url: String,
}

/// Toolchain section of the lockfile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ToolchainSection {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
}

/// Parsed lockfile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    #[serde(rename = "R", default)]
    pub toolchain: ToolchainSection,
    #[serde(rename = "Packages", default)]
    pub packages: BTreeMap<String, LockedPackage>,
}

impl Lockfile {
    /// Read a lockfile from disk
    pub fn from_path(path: &Path) -> LockfileResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| LockfileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse lockfile JSON
    pub fn from_json(text: &str) -> LockfileResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Direct dependency names per package, the resolver input
    pub fn dependency_edges(&self) -> BTreeMap<String, Vec<String>> {
        self.packages
            .iter()
            .map(|(name, pkg)| (name.clone(), pkg.requirements.clone()))
            .collect()
    }

    /// Look up a package
    pub fn get(&self, name: &str) -> Option<&LockedPackage> {
        self.packages.get(name)
    }

    /// Repository URLs declared in the header, by name
    pub fn repository_urls(&self) -> BTreeMap<String, String> {
        self.toolchain
            .repositories
            .iter()
            .map(|r| (r.name.clone(), r.url.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCKFILE: &str = r#"{
  "R": {
    "Version": "4.3.1",
    "Repositories": [{"Name": "CRAN", "URL": "https://cloud.r-project.org"}]
  },
  "Packages": {
    "formatters": {
      "Package": "formatters",
      "Version": "0.5.4",
      "Source": "Repository",
      "Repository": "CRAN",
      "Hash": "aa",
      "Requirements": ["methods"]
    },
    "teal": {
      "Package": "teal",
      "Version": "0.14.0",
      "Source": "GitHub",
      "RemoteType": "github",
      "RemoteHost": "api.github.com",
      "RemoteUsername": "insightsengineering",
      "RemoteRepo": "teal",
      "RemoteRef": "main",
      "RemoteSha": "0123abc",
      "Requirements": ["formatters", "shiny"]
    },
    "oddball": {
      "Package": "oddball",
      "Version": "1.0",
      "Source": "Bioconductor"
    }
  }
}"#;

    #[test]
    fn test_parse_lockfile() {
        let lock = Lockfile::from_json(LOCKFILE).unwrap();

        assert_eq!(lock.packages.len(), 3);
        assert_eq!(lock.toolchain.version.as_deref(), Some("4.3.1"));
        assert_eq!(
            lock.repository_urls().get("CRAN").map(String::as_str),
            Some("https://cloud.r-project.org")
        );

        let teal = lock.get("teal").unwrap();
        assert_eq!(teal.source, SourceKind::GitHub);
        assert_eq!(teal.requirements, vec!["formatters", "shiny"]);
        assert_eq!(lock.get("oddball").unwrap().source, SourceKind::Unknown);
    }

    #[test]
    fn test_dependency_edges_keep_dangling_names() {
        let lock = Lockfile::from_json(LOCKFILE).unwrap();
        let edges = lock.dependency_edges();

        assert_eq!(edges["teal"], vec!["formatters", "shiny"]);
        assert!(edges["oddball"].is_empty());
        assert!(!edges.contains_key("shiny"));
    }

    #[test]
    fn test_clone_url_and_ref() {
        let lock = Lockfile::from_json(LOCKFILE).unwrap();
        let teal = lock.get("teal").unwrap();

        assert_eq!(
            teal.clone_url().as_deref(),
            Some("https://github.com/insightsengineering/teal.git")
        );
        assert_eq!(teal.checkout_ref(), Some("0123abc"));
        assert_eq!(teal.archive_name(), "teal_0.14.0.tar.gz");
        assert_eq!(lock.get("formatters").unwrap().clone_url(), None);
    }

    #[test]
    fn test_gitlab_host() {
        let pkg: LockedPackage = serde_json::from_str(
            r#"{"Package": "x", "Version": "1", "Source": "GitLab",
                "RemoteHost": "gitlab.example.com", "RemoteUsername": "grp", "RemoteRepo": "x"}"#,
        )
        .unwrap();
        assert_eq!(pkg.clone_url().as_deref(), Some("https://gitlab.example.com/grp/x.git"));
    }

    #[test]
    fn test_missing_file() {
        let err = Lockfile::from_path(Path::new("/nonexistent/renv.lock")).unwrap_err();
        assert!(matches!(err, LockfileError::Io { .. }));
    }
}
