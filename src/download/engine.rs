//! Bounded-concurrency download engine.
//!
//! [`Downloader`] fetches every entry of a [`FileSet`] that is not already on
//! disk. Entries are dispatched in URL order, at most `concurrency` fetches
//! run at once, and one entry failing never affects the others.
//!
//! # Example
//!
//! ```no_run
//! use tts_archiver_core::download::{Downloader, HttpClient};
//! use tts_archiver_core::fileset::{AssetCategory, FileSet};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::new(HttpClient::new(), "tmp/", 3)?;
//! let mut files = FileSet::new();
//! files.add(AssetCategory::Image, "http://example.com/a.png");
//! let report = downloader.download(&files, &CancellationToken::new()).await?;
//! println!("downloaded {}, failed {}", report.downloaded.len(), report.failures.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::{DownloadError, HttpClient, layout};
use crate::fileset::{FileSet, ModuleFile};

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// One entry that could not be materialized.
#[derive(Debug)]
pub struct DownloadFailure {
    pub url: String,
    pub error: DownloadError,
}

/// Result of one [`Downloader::download`] batch.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Entries newly written to disk, sorted by URL, with sniffed extensions.
    pub downloaded: Vec<ModuleFile>,
    /// Entries whose local path already existed.
    pub skipped: usize,
    /// Entries that failed, sorted by URL.
    pub failures: Vec<DownloadFailure>,
    /// Whether the batch stopped early because of cancellation.
    pub cancelled: bool,
}

enum EntryOutcome {
    Downloaded(ModuleFile, PathBuf),
    Skipped,
    Failed(DownloadError),
    Cancelled,
}

/// Concurrent asset downloader writing below a fixed output root.
///
/// # Concurrency Model
///
/// - Each entry runs in its own Tokio task
/// - A semaphore permit is acquired before spawning, in URL order
/// - Permits are released automatically when a task completes (RAII)
/// - Cancellation stops dispatch and aborts in-flight fetches; finished
///   entries are still reported
#[derive(Debug)]
pub struct Downloader {
    client: HttpClient,
    output_root: PathBuf,
    semaphore: Arc<Semaphore>,
}

impl Downloader {
    /// Creates a downloader.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `concurrency` is
    /// outside `1..=32`.
    #[instrument(level = "debug", skip(client, output_root))]
    pub fn new(
        client: HttpClient,
        output_root: impl Into<PathBuf>,
        concurrency: usize,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        let output_root = output_root.into();
        debug!(concurrency, output_root = %output_root.display(), "creating downloader");

        Ok(Self {
            client,
            output_root,
            semaphore: Arc::new(Semaphore::new(concurrency)),
        })
    }

    /// Downloads every entry of `files` that is not already on disk.
    ///
    /// Individual failures are collected in the report and never returned as
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if the concurrency limiter is
    /// closed.
    #[instrument(skip(self, files, cancel), fields(entries = files.len()))]
    pub async fn download(
        &self,
        files: &FileSet,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport, EngineError> {
        let mut report = DownloadReport::default();
        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::new();

        for entry in files.sorted_entries() {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("cancelled before dispatching all entries");
                    break;
                }
                permit = Arc::clone(&self.semaphore).acquire_owned() => {
                    permit.map_err(|_| EngineError::SemaphoreClosed)?
                }
            };

            let client = self.client.clone();
            let output_root = self.output_root.clone();
            let cancel = cancel.clone();
            let url = entry.url().to_string();

            // A fetch that already finished wins over a cancellation seen in the same poll.
            let handle = tasks.spawn(async move {
                let _permit = permit;
                tokio::select! {
                    biased;
                    outcome = fetch_entry(&client, &entry, &output_root) => outcome,
                    () = cancel.cancelled() => EntryOutcome::Cancelled,
                }
            });
            in_flight.insert(handle.id(), url);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            record_outcome(&mut report, &mut in_flight, joined);
        }

        report.downloaded.sort_by(|a, b| a.url().cmp(b.url()));
        report.failures.sort_by(|a, b| a.url.cmp(&b.url));
        report.cancelled = cancel.is_cancelled();

        debug!(
            downloaded = report.downloaded.len(),
            skipped = report.skipped,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "download batch complete"
        );
        Ok(report)
    }
}

/// Files one finished task into the report under the URL it was spawned for.
fn record_outcome(
    report: &mut DownloadReport,
    in_flight: &mut HashMap<Id, String>,
    joined: Result<(Id, EntryOutcome), JoinError>,
) {
    let (id, outcome) = match joined {
        Ok(done) => done,
        Err(e) => {
            let url = in_flight.remove(&e.id()).unwrap_or_default();
            warn!(url = %url, error = %e, "download task panicked");
            let reason = e.to_string();
            report.failures.push(DownloadFailure {
                error: DownloadError::Task {
                    url: url.clone(),
                    reason,
                },
                url,
            });
            return;
        }
    };
    let url = in_flight.remove(&id).unwrap_or_default();

    match outcome {
        EntryOutcome::Downloaded(file, path) => {
            info!(url = %url, path = %path.display(), "downloaded");
            report.downloaded.push(file);
        }
        EntryOutcome::Skipped => {
            debug!(url = %url, "file already exists");
            report.skipped += 1;
        }
        EntryOutcome::Failed(error) => {
            warn!(url = %url, error = %error, "download failed");
            report.failures.push(DownloadFailure { url, error });
        }
        EntryOutcome::Cancelled => debug!(url = %url, "download cancelled"),
    }
}

async fn fetch_entry(client: &HttpClient, entry: &ModuleFile, output_root: &Path) -> EntryOutcome {
    if layout::exists(&layout::local_path(output_root, entry)).await {
        return EntryOutcome::Skipped;
    }

    match client.download_file(entry, output_root).await {
        Ok((file, path)) => EntryOutcome::Downloaded(file, path),
        Err(error) => EntryOutcome::Failed(error),
    }
}
