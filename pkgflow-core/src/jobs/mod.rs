//! Per-phase job builders
//!
//! Each builder captures one package's inputs and returns a [`PhaseJob`]
//! producing exactly one [`JobResult`].
//!
//! [`PhaseJob`]: crate::executor::PhaseJob
//! [`JobResult`]: crate::executor::JobResult

pub mod download;
pub mod install;
pub mod check;

pub use download::{download_job, archive_urls, DownloadSettings, DEFAULT_REPOSITORY_URL};
pub use install::{install_job, InstallSettings, INSTALL_VERB};
pub use check::{check_job, CheckSettings, CHECK_VERB};
