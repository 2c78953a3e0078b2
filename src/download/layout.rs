//! On-disk layout of materialized assets.
//!
//! Assets live at `<output root>/<category folder>/<filename><extension>`,
//! where the filename is derived from the normalized URL.

use std::path::{Path, PathBuf};

use crate::fileset::ModuleFile;
use crate::normalize::filename_from_url;
use crate::store::PersistedFile;

/// Expected local path of a discovered entry.
#[must_use]
pub fn local_path(output_root: &Path, file: &ModuleFile) -> PathBuf {
    output_root.join(file.relative_path())
}

/// Expected local path of a persisted row.
#[must_use]
pub fn persisted_path(output_root: &Path, row: &PersistedFile) -> PathBuf {
    let extension = row
        .category
        .fixed_extension()
        .unwrap_or(row.extension.as_str());
    output_root
        .join(row.category.folder())
        .join(format!("{}{extension}", filename_from_url(&row.url)))
}

/// Whether something already exists at `path`. Errors probing the path count
/// as absent so the download is attempted and reports the real failure.
pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
