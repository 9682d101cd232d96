//! Mapping from style names to the models that encode them.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Extension of model files picked up by [`StyleCatalog::from_dir`].
const MODEL_EXTENSION: &str = "onnx";

/// A named style and the model file that applies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleEntry {
    pub name: String,
    pub model: PathBuf,
}

impl StyleEntry {
    #[must_use]
    pub fn new(name: impl Into<String>, model: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
        }
    }
}

/// The styles available to apply, with one default preset.
///
/// The default is the explicitly chosen preset if set, otherwise the first entry.
#[derive(Debug, Clone, Default)]
pub struct StyleCatalog {
    entries: Vec<StyleEntry>,
    default: Option<String>,
}

impl StyleCatalog {
    /// Build a catalog from explicit entries. Later duplicates of a name are dropped.
    #[must_use]
    pub fn new(entries: Vec<StyleEntry>) -> Self {
        let mut unique: Vec<StyleEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            if unique.iter().any(|e| e.name == entry.name) {
                tracing::warn!(
                    "Ignoring duplicate style {:?} at {}",
                    entry.name,
                    entry.model.display()
                );
                continue;
            }
            unique.push(entry);
        }

        Self {
            entries: unique,
            default: None,
        }
    }

    /// Build a catalog from every `.onnx` file in `dir`, named by file stem and
    /// sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let dir_err = |source| Error::StyleDir {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = Vec::new();
        for entry in fs::read_dir(dir).map_err(dir_err)? {
            let path = entry.map_err(dir_err)?.path();
            let is_model = path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(MODEL_EXTENSION));
            if !is_model {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                entries.push(StyleEntry::new(name, &path));
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::debug!(
            "Found {} style model(s) in {}",
            entries.len(),
            dir.display()
        );

        Ok(Self::new(entries))
    }

    /// Make `name` the default preset.
    ///
    /// # Errors
    ///
    /// Returns an error if no style has that name.
    pub fn with_default(mut self, name: &str) -> Result<Self> {
        self.find(name)?;
        self.default = Some(name.to_string());
        Ok(self)
    }

    #[must_use]
    pub fn entries(&self) -> &[StyleEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The preset used when no style is chosen.
    #[must_use]
    pub fn default_style(&self) -> Option<&StyleEntry> {
        match &self.default {
            Some(name) => self.entries.iter().find(|e| &e.name == name),
            None => self.entries.first(),
        }
    }

    /// Resolve a style choice to its entry; `None` selects the default preset.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unknown or the catalog is empty.
    pub fn resolve(&self, name: Option<&str>) -> Result<&StyleEntry> {
        match name {
            Some(name) => self.find(name),
            None => self.default_style().ok_or_else(|| Error::UnknownStyle {
                name: "<default>".to_string(),
                available: Vec::new(),
            }),
        }
    }

    fn find(&self, name: &str) -> Result<&StyleEntry> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::UnknownStyle {
                name: name.to_string(),
                available: self.entries.iter().map(|e| e.name.clone()).collect(),
            })
    }
}
