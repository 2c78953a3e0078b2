//! Ingestion pipeline: scan every export in a directory, reconcile each
//! module against the store, download what is missing, persist the result.
//!
//! # Overview
//!
//! - A producer task fans out one scan task per `<id>.json` file, at most
//!   `scan_concurrency` at a time, and pushes each [`ScannedModule`] onto a
//!   bounded queue.
//! - A single consumer drains the queue and handles one module at a time:
//!   list persisted files, reconcile, drop the module's rows if any are
//!   orphaned, download, write file rows, then write the module watermark.
//! - Cancellation stops scanning and downloading; the consumer stops after
//!   the module it is working on.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tts_archiver_core::{Database, Downloader, HttpClient, Pipeline, PipelineOptions, SqliteStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::new(Database::new(Path::new("tmp/tts.db")).await?));
//! let downloader = Downloader::new(HttpClient::new(), "tmp/", 3)?;
//! let pipeline = Pipeline::new(store, downloader, PipelineOptions::default())?;
//! let summary = pipeline.run(Path::new("Workshop"), &CancellationToken::new()).await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

mod intake;

pub use intake::{
    DEFAULT_VERSION, IntakeError, ScannedModule, module_id_from_file_name, parse_export_date,
    scan_module_file,
};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::download::{Downloader, EngineError};
use crate::store::{AssetStore, NewFile, PersistedModule, StoreError};

/// Default number of export files scanned at once.
pub const DEFAULT_SCAN_CONCURRENCY: usize = 10;

/// Default capacity of the scanned-module queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input directory could not be listed.
    #[error("failed to read input directory {path}: {source}")]
    InputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A pipeline option is zero.
    #[error("invalid pipeline option {name}: {value} (must be at least 1)")]
    InvalidOption { name: &'static str, value: usize },

    /// The persistent store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The download engine failed as a whole.
    #[error("download engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Tuning knobs for [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub scan_concurrency: usize,
    pub queue_capacity: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            scan_concurrency: DEFAULT_SCAN_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Counters for one [`Pipeline::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Exports decoded and scanned successfully.
    pub modules_scanned: usize,
    /// Modules whose watermark was written.
    pub modules_ingested: usize,
    /// Exports that could not be read, decoded or dated.
    pub modules_failed: usize,
    /// Modules whose persisted rows were reset because of orphans.
    pub modules_with_orphans: usize,
    pub assets_discovered: usize,
    pub assets_downloaded: usize,
    pub assets_skipped: usize,
    pub assets_failed: usize,
    /// Whether the run was stopped by cancellation.
    pub cancelled: bool,
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} modules ingested ({} scanned, {} failed), {} assets discovered, {} downloaded, {} skipped, {} failed",
            self.modules_ingested,
            self.modules_scanned,
            self.modules_failed,
            self.assets_discovered,
            self.assets_downloaded,
            self.assets_skipped,
            self.assets_failed,
        )?;
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}

type ScanMessage = Result<ScannedModule, IntakeError>;

/// Orchestrates scanning, reconciliation, download and persistence.
pub struct Pipeline {
    store: Arc<dyn AssetStore>,
    downloader: Downloader,
    options: PipelineOptions,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("downloader", &self.downloader)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline over explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidOption`] when a concurrency or
    /// capacity option is zero.
    pub fn new(
        store: Arc<dyn AssetStore>,
        downloader: Downloader,
        options: PipelineOptions,
    ) -> Result<Self, PipelineError> {
        if options.scan_concurrency == 0 {
            return Err(PipelineError::InvalidOption {
                name: "scan_concurrency",
                value: 0,
            });
        }
        if options.queue_capacity == 0 {
            return Err(PipelineError::InvalidOption {
                name: "queue_capacity",
                value: 0,
            });
        }
        Ok(Self {
            store,
            downloader,
            options,
        })
    }

    /// Ingests every `<id>.json` export in `input_dir`.
    ///
    /// Files with other names are ignored. A file that fails to read, decode
    /// or date is logged and counted in [`IngestSummary::modules_failed`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InputDir`] if the directory cannot be listed,
    /// and [`PipelineError::Store`] / [`PipelineError::Engine`] on failures
    /// that make further progress meaningless. Work completed before the
    /// error stays persisted.
    #[instrument(skip(self, input_dir, cancel), fields(input_dir = %input_dir.display()))]
    pub async fn run(
        &self,
        input_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<IngestSummary, PipelineError> {
        let candidates = list_candidates(input_dir).await?;
        info!(candidates = candidates.len(), "starting ingestion");

        let scan_cancel = cancel.child_token();
        let (tx, mut rx) = mpsc::channel(self.options.queue_capacity);
        let producer = tokio::spawn(produce(
            candidates,
            self.options.scan_concurrency,
            tx,
            scan_cancel.clone(),
        ));

        let result = self.consume(&mut rx, cancel).await;

        // Stops any scans still running when the consumer bailed out early.
        scan_cancel.cancel();
        drop(rx);
        if let Err(e) = producer.await {
            warn!(error = %e, "scan producer panicked");
        }

        let mut summary = result?;
        summary.cancelled = cancel.is_cancelled();
        info!(
            modules_ingested = summary.modules_ingested,
            modules_failed = summary.modules_failed,
            assets_discovered = summary.assets_discovered,
            assets_downloaded = summary.assets_downloaded,
            assets_failed = summary.assets_failed,
            cancelled = summary.cancelled,
            "ingestion complete"
        );
        Ok(summary)
    }

    async fn consume(
        &self,
        rx: &mut mpsc::Receiver<ScanMessage>,
        cancel: &CancellationToken,
    ) -> Result<IngestSummary, PipelineError> {
        let mut summary = IngestSummary::default();

        loop {
            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                message = rx.recv() => message,
            };
            let Some(message) = message else {
                break;
            };

            match message {
                Ok(module) => {
                    summary.modules_scanned += 1;
                    self.ingest_module(module, cancel, &mut summary).await?;
                }
                Err(e) => {
                    summary.modules_failed += 1;
                    error!(path = %e.path().display(), error = %e, "module scan failed");
                }
            }
        }

        Ok(summary)
    }

    #[instrument(skip_all, fields(module_id = module.id, name = %module.name))]
    async fn ingest_module(
        &self,
        module: ScannedModule,
        cancel: &CancellationToken,
        summary: &mut IngestSummary,
    ) -> Result<(), PipelineError> {
        let ScannedModule {
            id,
            name,
            epoch_time,
            version_number,
            mut files,
        } = module;

        let persisted = self.store.list_files_by_module(id).await?;
        let orphans = files.reconcile(&persisted);
        if !orphans.is_empty() {
            let urls: Vec<&str> = orphans.iter().map(|o| o.url.as_str()).collect();
            warn!(module_id = id, orphans = ?urls, "orphaned files, resetting module file records");
            self.store.delete_files_by_module(id).await?;
            summary.modules_with_orphans += 1;
        }

        let discovered = files.len();
        summary.assets_discovered += discovered;

        let report = self.downloader.download(&files, cancel).await?;
        summary.assets_downloaded += report.downloaded.len();
        summary.assets_skipped += report.skipped;
        summary.assets_failed += report.failures.len();

        let rows: Vec<NewFile> = report
            .downloaded
            .iter()
            .map(|file| NewFile::from_module_file(id, file))
            .collect();
        self.store.batch_create_files(&rows).await?;

        if report.cancelled {
            info!(
                module_id = id,
                downloaded = rows.len(),
                "cancelled, module left without watermark"
            );
            return Ok(());
        }

        self.store
            .create_module(&PersistedModule {
                id,
                name: name.clone(),
                epoch_time,
                version_number,
            })
            .await?;
        summary.modules_ingested += 1;

        info!(
            module_id = id,
            name = %name,
            discovered,
            downloaded = report.downloaded.len(),
            skipped = report.skipped,
            failed = report.failures.len(),
            "module ingested"
        );
        Ok(())
    }
}

/// Lists `(module id, path)` for every export file name in `input_dir`.
async fn list_candidates(input_dir: &Path) -> Result<Vec<(i64, PathBuf)>, PipelineError> {
    let read_dir_error = |source| PipelineError::InputDir {
        path: input_dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(input_dir)
        .await
        .map_err(read_dir_error)?;
    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_dir_error)? {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        match module_id_from_file_name(file_name) {
            Some(id) => candidates.push((id, entry.path())),
            None => debug!(file_name, "ignoring non-module file"),
        }
    }
    candidates.sort();
    Ok(candidates)
}

/// Scans candidates with bounded fan-out and feeds the consumer queue.
async fn produce(
    candidates: Vec<(i64, PathBuf)>,
    concurrency: usize,
    tx: mpsc::Sender<ScanMessage>,
    cancel: CancellationToken,
) {
    let throttle = Arc::new(Semaphore::new(concurrency));
    let mut scans = JoinSet::new();

    for (id, path) in candidates {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            permit = Arc::clone(&throttle).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let tx = tx.clone();
        let cancel = cancel.clone();
        scans.spawn(async move {
            let _permit = permit;
            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                message = scan_module_file(id, &path) => message,
            };
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                sent = tx.send(message) => {
                    if sent.is_err() {
                        debug!(module_id = id, "consumer gone, dropping scanned module");
                    }
                }
            }
        });
    }

    while let Some(joined) = scans.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "scan task panicked");
        }
    }
    info!("parsing completed");
}
