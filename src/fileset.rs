//! Categorized asset sets discovered for one module.
//!
//! A [`FileSet`] holds one URL-keyed map per [`AssetCategory`]. Scanning
//! builds it bottom-up by merging child sets into their parent, reconciliation
//! folds the persisted rows for the module into it, and the downloader
//! consumes it in URL order.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::normalize::{filename_from_url, normalize_url};
use crate::store::PersistedFile;

/// Kind of asset, which decides storage folder and default extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetCategory {
    /// Unity asset bundle (`.unity3d`).
    Bundle,
    /// Wavefront mesh or collider (`.obj`).
    Model,
    /// Texture, card sheet, decal or UI image.
    Image,
    /// Rule book or handout (`.PDF`).
    Pdf,
    /// Music player track.
    Audio,
}

impl AssetCategory {
    /// Every category, in union-precedence order (later wins).
    pub const ALL: [Self; 5] = [Self::Bundle, Self::Model, Self::Image, Self::Pdf, Self::Audio];

    /// Stable label used for persistence and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bundle => "bundle",
            Self::Model => "model",
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Audio => "audio",
        }
    }

    /// Output subfolder for this category.
    #[must_use]
    pub fn folder(self) -> &'static str {
        match self {
            Self::Bundle => "Assetbundles",
            Self::Model => "Models",
            Self::Image => "Images",
            Self::Pdf => "PDF",
            Self::Audio => "Audio",
        }
    }

    /// Extension forced by the category, if any. Images and audio keep
    /// whatever was sniffed or previously recorded.
    #[must_use]
    pub fn fixed_extension(self) -> Option<&'static str> {
        match self {
            Self::Bundle => Some(".unity3d"),
            Self::Model => Some(".obj"),
            Self::Pdf => Some(".PDF"),
            Self::Image | Self::Audio => None,
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown asset category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for AssetCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bundle" => Ok(Self::Bundle),
            "model" => Ok(Self::Model),
            "image" => Ok(Self::Image),
            "pdf" => Ok(Self::Pdf),
            "audio" => Ok(Self::Audio),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// One discovered asset reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFile {
    url: String,
    category: AssetCategory,
    extension: Option<String>,
}

impl ModuleFile {
    /// Creates an entry from a raw URL. Returns `None` when the URL is empty
    /// after normalization.
    #[must_use]
    pub fn new(category: AssetCategory, raw_url: &str) -> Option<Self> {
        let url = normalize_url(raw_url);
        if url.is_empty() {
            return None;
        }
        Some(Self {
            url,
            category,
            extension: None,
        })
    }

    /// Normalized URL; identity of the entry within a module.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn category(&self) -> AssetCategory {
        self.category
    }

    /// Records an extension, typically from content sniffing.
    pub fn set_extension(&mut self, extension: impl Into<String>) {
        self.extension = Some(extension.into());
    }

    /// Effective extension including the leading dot, or empty when unknown.
    #[must_use]
    pub fn extension(&self) -> &str {
        self.category
            .fixed_extension()
            .or(self.extension.as_deref())
            .unwrap_or("")
    }

    /// Whether the download must sniff the body to learn the extension.
    #[must_use]
    pub fn needs_sniffing(&self) -> bool {
        self.category.fixed_extension().is_none() && self.extension.is_none()
    }

    /// File stem derived from the URL.
    #[must_use]
    pub fn file_name(&self) -> String {
        filename_from_url(&self.url)
    }

    /// Path relative to the output root: `<folder>/<stem><extension>`.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.category.folder()).join(format!("{}{}", self.file_name(), self.extension()))
    }
}

/// Categorized asset set for one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    bundles: BTreeMap<String, ModuleFile>,
    models: BTreeMap<String, ModuleFile>,
    images: BTreeMap<String, ModuleFile>,
    pdfs: BTreeMap<String, ModuleFile>,
    audio: BTreeMap<String, ModuleFile>,
}

impl FileSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, category: AssetCategory) -> &BTreeMap<String, ModuleFile> {
        match category {
            AssetCategory::Bundle => &self.bundles,
            AssetCategory::Model => &self.models,
            AssetCategory::Image => &self.images,
            AssetCategory::Pdf => &self.pdfs,
            AssetCategory::Audio => &self.audio,
        }
    }

    fn map_mut(&mut self, category: AssetCategory) -> &mut BTreeMap<String, ModuleFile> {
        match category {
            AssetCategory::Bundle => &mut self.bundles,
            AssetCategory::Model => &mut self.models,
            AssetCategory::Image => &mut self.images,
            AssetCategory::Pdf => &mut self.pdfs,
            AssetCategory::Audio => &mut self.audio,
        }
    }

    /// Adds a raw URL under `category`. Empty URLs are ignored; a repeated
    /// URL collapses onto the existing entry.
    pub fn add(&mut self, category: AssetCategory, raw_url: &str) {
        if let Some(file) = ModuleFile::new(category, raw_url) {
            self.insert(file);
        }
    }

    /// Inserts an entry, replacing any entry with the same URL in its category.
    pub fn insert(&mut self, file: ModuleFile) {
        self.map_mut(file.category).insert(file.url.clone(), file);
    }

    /// Absorbs every entry of `other` into `self`.
    pub fn merge(&mut self, other: FileSet) {
        let FileSet {
            bundles,
            models,
            images,
            pdfs,
            audio,
        } = other;
        self.bundles.extend(bundles);
        self.models.extend(models);
        self.images.extend(images);
        self.pdfs.extend(pdfs);
        self.audio.extend(audio);
    }

    /// Entries of a single category, ordered by URL.
    pub fn category(&self, category: AssetCategory) -> impl Iterator<Item = &ModuleFile> {
        self.map(category).values()
    }

    /// Number of entries in one category.
    #[must_use]
    pub fn count(&self, category: AssetCategory) -> usize {
        self.map(category).len()
    }

    /// Whether the normalized form of `url` is known in any category.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        let url = normalize_url(url);
        AssetCategory::ALL
            .iter()
            .any(|category| self.map(*category).contains_key(&url))
    }

    /// Union of all categories keyed by URL. A URL present in several
    /// categories keeps the entry of the last category in
    /// [`AssetCategory::ALL`].
    #[must_use]
    pub fn all(&self) -> BTreeMap<&str, &ModuleFile> {
        let mut all = BTreeMap::new();
        for category in AssetCategory::ALL {
            for (url, file) in self.map(category) {
                all.insert(url.as_str(), file);
            }
        }
        all
    }

    /// Union of all categories, sorted by URL.
    #[must_use]
    pub fn sorted_entries(&self) -> Vec<ModuleFile> {
        self.all().into_values().cloned().collect()
    }

    /// Number of distinct URLs across all categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.all().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        AssetCategory::ALL
            .iter()
            .all(|category| self.map(*category).is_empty())
    }

    /// Folds persisted rows for this module into the set.
    ///
    /// A row whose URL is present in its category's map updates that entry
    /// with the persisted extension, so known extensions are not sniffed
    /// again. A row with no match is an orphan and is returned.
    pub fn reconcile(&mut self, persisted: &[PersistedFile]) -> Vec<PersistedFile> {
        let mut orphans = Vec::new();
        for row in persisted {
            let Some(entry) = self.map_mut(row.category).get_mut(&row.url) else {
                orphans.push(row.clone());
                continue;
            };
            entry.category = row.category;
            entry.extension = (!row.extension.is_empty()).then(|| row.extension.clone());
        }
        orphans
    }
}
