//! Artifact transport
//!
//! Archives are fetched over HTTP with reqwest; version-controlled sources
//! are checked out with the system `git`. Both land in a `.part` sibling of
//! the destination and are renamed into place only once complete, so a
//! destination that exists is always a finished artifact.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors raised while transferring an artifact
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Clone of {url} failed: {message}")]
    CloneFailed { url: String, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Moves source artifacts from their origin to the local filesystem
#[async_trait]
pub trait SourceTransport: Send + Sync {
    /// Download `url` to `dest`, returning the number of bytes written
    async fn fetch_archive(&self, url: &str, dest: &Path) -> TransportResult<u64>;

    /// Clone `url` into `dest` and check out `reference` if given
    async fn clone_repo(&self, url: &str, reference: Option<&str>, dest: &Path) -> TransportResult<()>;
}

/// reqwest for archives, `git` for checkouts
#[derive(Debug, Clone)]
pub struct HttpGitTransport {
    client: Client,
    git: OsString,
}

impl Default for HttpGitTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpGitTransport {
    /// Transport using the `git` found on `PATH`
    pub fn new() -> Self {
        Self::with_git("git")
    }

    /// Transport using a specific `git` executable
    pub fn with_git(git: impl Into<OsString>) -> Self {
        Self {
            client: Client::new(),
            git: git.into(),
        }
    }

    async fn git(&self, url: &str, args: &[&OsStr]) -> TransportResult<()> {
        let output = Command::new(&self.git)
            .args(args)
            .output()
            .await
            .map_err(|e| TransportError::CloneFailed {
                url: url.to_string(),
                message: format!("failed to run git: {e}"),
            })?;

        if !output.status.success() {
            return Err(TransportError::CloneFailed {
                url: url.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Sibling path used while a download is in progress
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[async_trait]
impl SourceTransport for HttpGitTransport {
    async fn fetch_archive(&self, url: &str, dest: &Path) -> TransportResult<u64> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound(url.to_string()));
        }
        if !response.status().is_success() {
            return Err(TransportError::Network(format!("{url}: HTTP {}", response.status())));
        }

        let tmp = part_path(dest);
        let bytes = match stream_to_file(response, &tmp).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(e);
            }
        };
        tokio::fs::rename(&tmp, dest).await.map_err(|source| io_error(dest, source))?;

        info!("Downloaded {} ({} bytes)", url, bytes);
        Ok(bytes)
    }

    async fn clone_repo(&self, url: &str, reference: Option<&str>, dest: &Path) -> TransportResult<()> {
        info!("Cloning {}", url);
        let staging = part_path(dest);
        remove_dir_if_present(&staging).await?;

        if let Err(e) = self.checkout(url, reference, &staging).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        remove_dir_if_present(dest).await?;
        tokio::fs::rename(&staging, dest)
            .await
            .map_err(|source| io_error(dest, source))
    }
}

impl HttpGitTransport {
    async fn checkout(&self, url: &str, reference: Option<&str>, dir: &Path) -> TransportResult<()> {
        self.git(
            url,
            &[OsStr::new("clone"), OsStr::new("--quiet"), OsStr::new(url), dir.as_os_str()],
        )
        .await?;

        if let Some(reference) = reference {
            debug!("Checking out {} in {}", reference, dir.display());
            self.git(
                url,
                &[
                    OsStr::new("-C"),
                    dir.as_os_str(),
                    OsStr::new("checkout"),
                    OsStr::new("--quiet"),
                    OsStr::new(reference),
                ],
            )
            .await?;
        }
        Ok(())
    }
}

async fn stream_to_file(response: Response, path: &Path) -> TransportResult<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|source| io_error(path, source))?;
    let mut body = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await.map_err(|source| io_error(path, source))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|source| io_error(path, source))?;
    Ok(written)
}

async fn remove_dir_if_present(dir: &Path) -> TransportResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(io_error(dir, e)),
        _ => Ok(()),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> TransportError {
    TransportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/dl/teal_0.1.tar.gz")),
            PathBuf::from("/dl/teal_0.1.tar.gz.part")
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_network_error() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("a_1.0.tar.gz");

        let err = HttpGitTransport::new()
            .fetch_archive("http://127.0.0.1:9/src/contrib/a_1.0.tar.gz", &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
        assert!(!dest.exists());
    }

    /// Stand-in `git`: clone always works, checkout only of `good`
    #[cfg(unix)]
    fn scripted_git(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("git");
        std::fs::write(
            &path,
            "#!/bin/sh\n\
             if [ \"$1\" = clone ]; then mkdir -p \"$4/.git\"; exit 0; fi\n\
             if [ \"$5\" = good ]; then exit 0; fi\n\
             echo \"error: pathspec '$5' did not match\" >&2; exit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_checkout_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let transport = HttpGitTransport::with_git(scripted_git(tmp.path()));
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        let dest = tmp.path().join("src/teal");

        let err = transport
            .clone_repo("https://github.com/org/teal.git", Some("deadbeef"), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::CloneFailed { ref message, .. } if message.contains("deadbeef")));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_checkout_is_moved_into_place() {
        let tmp = TempDir::new().unwrap();
        let transport = HttpGitTransport::with_git(scripted_git(tmp.path()));
        let dest = tmp.path().join("src/teal");
        std::fs::create_dir_all(part_path(&dest).join("stale")).unwrap();

        transport
            .clone_repo("https://github.com/org/teal.git", Some("good"), &dest)
            .await
            .unwrap();

        assert!(dest.join(".git").is_dir());
        assert!(!dest.join("stale").exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_missing_git_is_a_clone_failure() {

        let tmp = TempDir::new().unwrap();
        let err = HttpGitTransport::with_git("/nonexistent/bin/git")
            .clone_repo("https://github.com/org/repo.git", Some("main"), &tmp.path().join("repo"))
            .await
            .unwrap_err();

        match err {
            TransportError::CloneFailed { url, message } => {
                assert_eq!(url, "https://github.com/org/repo.git");
                assert!(message.contains("failed to run git"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
