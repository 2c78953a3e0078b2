//! TTS Archiver Core Library
//!
//! Archives the external assets of exported Tabletop Simulator modules: every
//! mesh, texture, card sheet, PDF, audio track and asset bundle a module
//! references is discovered, reconciled against what was archived before,
//! and downloaded into a category-organized directory tree.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`normalize`] - URL normalization and filename derivation
//! - [`document`] - serde model of a module export
//! - [`fileset`] - categorized asset sets and reconciliation
//! - [`scanner`] - recursive asset discovery over the object graph
//! - [`download`] - bounded-concurrency download engine with content sniffing
//! - [`store`] / [`db`] - persisted file and module records
//! - [`pipeline`] - scan, reconcile, download, persist
//! - [`audit`] - persisted records versus files on disk
//! - [`config`] - environment-driven settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod audit;
pub mod config;
pub mod db;
pub mod document;
pub mod download;
pub mod fileset;
pub mod normalize;
pub mod pipeline;
pub mod scanner;
pub mod store;
mod user_agent;

// Re-export commonly used types
pub use audit::{AuditReport, MissingAsset, audit};
pub use config::{ConfigError, IngestConfig};
pub use db::{Database, DbError};
pub use download::{
    DEFAULT_CONCURRENCY, DownloadError, DownloadReport, Downloader, EngineError, HttpClient,
};
pub use fileset::{AssetCategory, FileSet, ModuleFile};
pub use normalize::{filename_from_url, normalize_url};
pub use pipeline::{IngestSummary, IntakeError, Pipeline, PipelineError, PipelineOptions};
pub use scanner::scan_document;
pub use store::{
    AssetStore, ModuleId, NewFile, PersistedFile, PersistedModule, SqliteStore, StoreError,
};
