//! Integrity check of persisted files against the output directory.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::download::layout;
use crate::store::{AssetStore, ModuleId, StoreError};

/// A persisted file missing from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAsset {
    pub module_id: ModuleId,
    pub url: String,
    pub expected_path: PathBuf,
}

/// Result of [`audit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub modules_checked: usize,
    pub files_checked: usize,
    pub missing: Vec<MissingAsset>,
}

impl AuditReport {
    /// Whether every persisted file was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Checks that every file row of every ingested module exists below
/// `output_root`.
///
/// # Errors
///
/// Returns [`StoreError`] if the store cannot be read.
#[instrument(skip(store, output_root), fields(output_root = %output_root.display()))]
pub async fn audit(store: &dyn AssetStore, output_root: &Path) -> Result<AuditReport, StoreError> {
    let mut report = AuditReport::default();

    for module in store.list_modules().await? {
        report.modules_checked += 1;
        for row in store.list_files_by_module(module.id).await? {
            report.files_checked += 1;
            let expected_path = layout::persisted_path(output_root, &row);
            if !layout::exists(&expected_path).await {
                warn!(
                    module_id = module.id,
                    url = %row.url,
                    path = %expected_path.display(),
                    "missing asset"
                );
                report.missing.push(MissingAsset {
                    module_id: module.id,
                    url: row.url,
                    expected_path,
                });
            }
        }
    }

    info!(
        modules = report.modules_checked,
        files = report.files_checked,
        missing = report.missing.len(),
        "audit complete"
    );
    Ok(report)
}
