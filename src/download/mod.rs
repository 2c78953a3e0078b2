//! HTTP download engine for materializing module assets on disk.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large bundles)
//! - Content sniffing for entries without a known extension, without
//!   re-fetching or buffering the whole body
//! - Semaphore-bounded concurrency with cancellation
//! - Per-entry failure isolation: a failed URL is reported, never fatal
//! - Sign-in redirect detection
//!
//! # Example
//!
//! ```no_run
//! use tts_archiver_core::download::HttpClient;
//! use tts_archiver_core::fileset::{AssetCategory, ModuleFile};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let entry = ModuleFile::new(AssetCategory::Image, "http://example.com/a.png").ok_or("empty")?;
//! let (file, path) = client.download_file(&entry, Path::new("tmp")).await?;
//! println!("{} -> {}", file.url(), path.display());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
pub mod layout;
pub mod sniff;

pub use client::HttpClient;
pub use constants::DEFAULT_CONCURRENCY;
pub use engine::{DownloadFailure, DownloadReport, Downloader, EngineError};
pub use error::DownloadError;

// Note: no module-local Result alias; signatures spell out
// `Result<T, DownloadError>`.
