//! Download job: fetch one package's source artifact
//!
//! Repository packages try the current-release archive first and the
//! historical archive second. GitHub and GitLab packages are cloned and the
//! checkout directory is the artifact. Artifacts already on disk are reused.

use crate::executor::{Cost, EngineError, JobResult, Outcome, Phase, PhaseJob};
use crate::lockfile::{DEFAULT_REPOSITORY, LockedPackage, SourceKind};
use crate::transport::{SourceTransport, TransportError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

/// URL used for the default repository when no other is configured
pub const DEFAULT_REPOSITORY_URL: &str = "https://cloud.r-project.org";

/// Where downloads go and where repositories live
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Archives are stored here, checkouts under `src/`
    pub downloads_dir: PathBuf,
    /// Repository base URLs by name
    pub repositories: BTreeMap<String, String>,
}

impl DownloadSettings {
    /// Base URL of the repository a package comes from
    pub fn repository_url<'a>(&'a self, package: &'a LockedPackage) -> Option<&'a str> {
        let name = package.repository.as_deref().unwrap_or(DEFAULT_REPOSITORY);
        if name.starts_with("http://") || name.starts_with("https://") {
            return Some(name);
        }
        match self.repositories.get(name) {
            Some(url) => Some(url.as_str()),
            None if name == DEFAULT_REPOSITORY => Some(DEFAULT_REPOSITORY_URL),
            None => None,
        }
    }

    /// Local path of a repository archive
    pub fn archive_path(&self, package: &LockedPackage) -> PathBuf {
        self.downloads_dir.join(package.archive_name())
    }

    /// Local path of a checkout
    pub fn checkout_path(&self, package: &LockedPackage) -> PathBuf {
        self.downloads_dir.join("src").join(&package.package)
    }
}

/// Current-release and historical archive URLs, in the order they are tried
pub fn archive_urls(base: &str, package: &LockedPackage) -> [String; 2] {
    let base = base.trim_end_matches('/');
    let file = package.archive_name();
    [
        format!("{base}/src/contrib/{file}"),
        format!("{base}/src/contrib/Archive/{}/{file}", package.package),
    ]
}

/// Outcome for a failed checkout, by hosting kind
fn clone_failure(kind: SourceKind) -> Outcome {
    match kind {
        SourceKind::GitLab => Outcome::GitlabCloneFailed,
        _ => Outcome::GithubCloneFailed,
    }
}

/// Build the download job for one package
pub fn download_job(
    transport: Arc<dyn SourceTransport>,
    settings: Arc<DownloadSettings>,
    package: LockedPackage,
) -> PhaseJob<JobResult> {
    let name = package.package.clone();
    PhaseJob::new(name, async move {
        match package.source {
            SourceKind::Repository => fetch_archive(transport.as_ref(), &settings, &package).await,
            SourceKind::GitHub | SourceKind::GitLab => {
                fetch_checkout(transport.as_ref(), &settings, &package).await
            }
            kind @ (SourceKind::Local | SourceKind::Unknown) => Ok(JobResult::failure(
                Phase::Download,
                &package.package,
                Outcome::NotFound,
                format!("{} has source kind '{kind}', which cannot be downloaded", package.package),
                Cost::Bytes(0),
            )),
        }
    })
}

async fn fetch_archive(
    transport: &dyn SourceTransport,
    settings: &DownloadSettings,
    package: &LockedPackage,
) -> Result<JobResult, EngineError> {
    let name = package.package.as_str();
    let dest = settings.archive_path(package);

    if let Ok(meta) = tokio::fs::metadata(&dest).await
        && meta.is_file()
    {
        debug!(package = name, "archive already downloaded");
        return Ok(JobResult::success(
            Phase::Download,
            name,
            format!("{} already downloaded", package.archive_name()),
            Cost::Bytes(meta.len()),
            dest,
        ));
    }

    let Some(base) = settings.repository_url(package) else {
        return Ok(JobResult::failure(
            Phase::Download,
            name,
            Outcome::NotFound,
            format!(
                "{name}: unknown repository '{}'",
                package.repository.as_deref().unwrap_or(DEFAULT_REPOSITORY)
            ),
            Cost::Bytes(0),
        ));
    };

    ensure_dir(&settings.downloads_dir).await?;
    for url in archive_urls(base, package) {
        match transport.fetch_archive(&url, &dest).await {
            Ok(bytes) => {
                return Ok(JobResult::success(
                    Phase::Download,
                    name,
                    format!("downloaded {url}"),
                    Cost::Bytes(bytes),
                    dest,
                ));
            }
            Err(TransportError::NotFound(_)) => debug!(package = name, url = %url, "not found, trying next location"),
            Err(TransportError::Io { path, source }) => return Err(EngineError::io(path, source)),
            Err(e) => {
                return Ok(JobResult::failure(
                    Phase::Download,
                    name,
                    Outcome::NetworkFailure,
                    e.to_string(),
                    Cost::Bytes(0),
                ));
            }
        }
    }

    Ok(JobResult::failure(
        Phase::Download,
        name,
        Outcome::NotFound,
        format!("{name} {} not found in {base}", package.version),
        Cost::Bytes(0),
    ))
}

async fn fetch_checkout(
    transport: &dyn SourceTransport,
    settings: &DownloadSettings,
    package: &LockedPackage,
) -> Result<JobResult, EngineError> {
    let name = package.package.as_str();
    let dest = settings.checkout_path(package);

    if tokio::fs::try_exists(dest.join(".git")).await.unwrap_or(false) {
        debug!(package = name, "checkout already present");
        let bytes = directory_size(dest.clone()).await;
        return Ok(JobResult::success(
            Phase::Download,
            name,
            format!("{name} already checked out"),
            Cost::Bytes(bytes),
            dest,
        ));
    }

    let Some(url) = package.clone_url() else {
        return Ok(JobResult::failure(
            Phase::Download,
            name,
            clone_failure(package.source),
            format!("{name}: no remote repository recorded"),
            Cost::Bytes(0),
        ));
    };

    if let Some(parent) = dest.parent() {
        ensure_dir(parent).await?;
    }
    match transport.clone_repo(&url, package.checkout_ref(), &dest).await {
        Ok(()) => {
            let bytes = directory_size(dest.clone()).await;
            Ok(JobResult::success(
                Phase::Download,
                name,
                format!("cloned {url}"),
                Cost::Bytes(bytes),
                dest,
            ))
        }
        Err(TransportError::Io { path, source }) => Err(EngineError::io(path, source)),
        Err(e) => Ok(JobResult::failure(
            Phase::Download,
            name,
            clone_failure(package.source),
            e.to_string(),
            Cost::Bytes(0),
        )),
    }
}

async fn ensure_dir(dir: &Path) -> Result<(), EngineError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| EngineError::io(dir, e))
}

/// Total size of the files below `dir`; unreadable entries count as zero
async fn directory_size(dir: PathBuf) -> u64 {
    tokio::task::spawn_blocking(move || {
        WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    })
    .await
    .unwrap_or(0)
}
