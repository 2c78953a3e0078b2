//! Turning one export file on disk into a scanned module.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::document::ModuleDocument;
use crate::fileset::FileSet;
use crate::scanner::scan_document;
use crate::store::ModuleId;

/// Version recorded when an export carries none.
pub const DEFAULT_VERSION: &str = "0";

/// Accepted export timestamp layouts, tried in order. All are read as UTC.
///
/// The first two cover the usual `M/D/YYYY h:mm:ss AM|PM` form, including
/// exports that write a 24-hour clock next to the marker. The last is the
/// plain 24-hour form.
const DATE_FORMATS: [&str; 3] = [
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
];

#[allow(clippy::expect_used)]
static MODULE_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)\.json$").expect("module file name pattern is valid")
});

/// Errors that fail a single export file. They never abort the run.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid module export.
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The `Date` field matches none of the accepted layouts.
    #[error("unrecognized export date '{value}' in {path}")]
    Timestamp { path: PathBuf, value: String },
}

impl IntakeError {
    /// Path of the export file that failed.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. } | Self::Decode { path, .. } | Self::Timestamp { path, .. } => {
                path
            }
        }
    }
}

/// A decoded and scanned export, ready for reconciliation.
#[derive(Debug, Clone)]
pub struct ScannedModule {
    pub id: ModuleId,
    pub name: String,
    /// Export timestamp in seconds since the Unix epoch.
    pub epoch_time: i64,
    /// Version string, [`DEFAULT_VERSION`] when the export has none.
    pub version_number: String,
    pub files: FileSet,
}

/// Extracts the module id from an export file name (`<digits>.json`).
///
/// Returns `None` for any other name, and for ids that do not fit an `i64`.
#[must_use]
pub fn module_id_from_file_name(file_name: &str) -> Option<ModuleId> {
    let digits = MODULE_FILE_NAME.captures(file_name)?.get(1)?.as_str();
    match digits.parse() {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(file_name, error = %e, "module id out of range, skipping");
            None
        }
    }
}

/// Parses an export timestamp into epoch seconds.
#[must_use]
pub fn parse_export_date(value: &str) -> Option<i64> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|timestamp| timestamp.and_utc().timestamp())
}

/// Reads, decodes and scans one export file.
///
/// # Errors
///
/// Returns an [`IntakeError`] when the file cannot be read or decoded, or
/// when its date is not in an accepted layout.
#[instrument(skip(path), fields(path = %path.display()))]
pub async fn scan_module_file(id: ModuleId, path: &Path) -> Result<ScannedModule, IntakeError> {
    let raw = tokio::fs::read(path).await.map_err(|source| IntakeError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let document: ModuleDocument =
        serde_json::from_slice(&raw).map_err(|source| IntakeError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    let epoch_time = parse_export_date(&document.date).ok_or_else(|| IntakeError::Timestamp {
        path: path.to_path_buf(),
        value: document.date.clone(),
    })?;

    let files = scan_document(&document);
    debug!(discovered = files.len(), "scanned module");

    let version_number = if document.version_number.is_empty() {
        DEFAULT_VERSION.to_string()
    } else {
        document.version_number
    };

    Ok(ScannedModule {
        id,
        name: document.save_name,
        epoch_time,
        version_number,
        files,
    })
}
