//! Plugin store catalog.
//!
//! A catalog is a JSON array of store entries. Relative `file` paths are
//! resolved against the directory holding the catalog file.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// One installable plugin listed in the store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    pub category: String,
    /// Descriptor path, resolved on load.
    pub file: PathBuf,
}

/// Store listing in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginCatalog {
    entries: Vec<CatalogEntry>,
}

impl PluginCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Parses a JSON listing; relative files resolve against `base_dir`.
    pub fn from_json_str(raw: &str, base_dir: &Path) -> Result<Self, CatalogError> {
        let mut entries: Vec<CatalogEntry> =
            serde_json::from_str(raw).map_err(CatalogError::Parse)?;
        for entry in &mut entries {
            if entry.file.is_relative() {
                entry.file = base_dir.join(&entry.file);
            }
        }
        Ok(Self { entries })
    }

    /// Reads a JSON listing from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json_str(&raw, base_dir)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Exact-name lookup.
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Entries of one category, in listing order.
    pub fn by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a CatalogEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.category == category)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Catalog loading and lookup errors.
#[derive(Debug)]
pub enum CatalogError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    UnknownEntry(String),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read catalog `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid catalog JSON: {err}"),
            Self::UnknownEntry(name) => write!(f, "catalog has no plugin named `{name}`"),
        }
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::UnknownEntry(_) => None,
        }
    }
}
