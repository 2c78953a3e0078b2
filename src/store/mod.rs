//! Persistent record of downloaded files and ingested modules.
//!
//! The ingestion core only talks to storage through [`AssetStore`], a small
//! CRUD contract. [`SqliteStore`] is the production implementation backed by
//! [`Database`](crate::Database).
//!
//! # Example
//!
//! ```ignore
//! use tts_archiver_core::{AssetStore, Database, SqliteStore};
//!
//! let store = SqliteStore::new(Database::new_in_memory().await?);
//! let known = store.list_files_by_module(12345).await?;
//! ```

mod error;
mod sqlite;

pub use error::{StoreDbErrorKind, StoreError};
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::fileset::{AssetCategory, ModuleFile};

/// Workshop identifier of a module (the numeric export file name).
pub type ModuleId = i64;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A file row as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedFile {
    pub id: i64,
    pub module_id: ModuleId,
    pub category: AssetCategory,
    /// Normalized URL; unique across all modules.
    pub url: String,
    /// Extension including the leading dot, empty when unknown.
    pub extension: String,
}

/// A file row to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub module_id: ModuleId,
    pub category: AssetCategory,
    pub url: String,
    pub extension: String,
}

impl NewFile {
    /// Builds the row for a file materialized for `module_id`.
    #[must_use]
    pub fn from_module_file(module_id: ModuleId, file: &ModuleFile) -> Self {
        Self {
            module_id,
            category: file.category(),
            url: file.url().to_string(),
            extension: file.extension().to_string(),
        }
    }
}

/// Watermark row written once a module's ingestion completes.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PersistedModule {
    pub id: ModuleId,
    pub name: String,
    /// Export timestamp in seconds since the Unix epoch.
    pub epoch_time: i64,
    pub version_number: String,
}

/// Data-access contract consumed by the ingestion pipeline and audit.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Returns every file row owned by `module_id`.
    async fn list_files_by_module(&self, module_id: ModuleId) -> Result<Vec<PersistedFile>>;

    /// Removes every file row owned by `module_id`, returning the row count.
    async fn delete_files_by_module(&self, module_id: ModuleId) -> Result<u64>;

    /// Inserts file rows. Rows whose URL already exists are skipped silently.
    async fn batch_create_files(&self, files: &[NewFile]) -> Result<()>;

    /// Writes the module watermark, replacing an existing row for the same id.
    async fn create_module(&self, module: &PersistedModule) -> Result<()>;

    /// Returns every module watermark, ordered by id.
    async fn list_modules(&self) -> Result<Vec<PersistedModule>>;

    /// Returns one module watermark.
    async fn get_module(&self, module_id: ModuleId) -> Result<Option<PersistedModule>>;
}
