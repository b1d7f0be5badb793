//! Configuration store
//!
//! The configuration is a JSON document:
//!
//! ```json
//! {
//!   "files": {
//!     "Invoices": {
//!       "Standard": {
//!         "path": "templates/invoice.xlsx",
//!         "mappings": {
//!           "Labels!A1": "B2",
//!           "Labels!A2": { "cell": "B3", "serial": true }
//!         }
//!       }
//!     }
//!   },
//!   "serial_numbers": { "INV": 4 }
//! }
//! ```
//!
//! Mapping keys are label references, values the destination coordinate that
//! receives the user's answer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Destination of one mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingTarget {
    /// Plain coordinate, `"B2"`
    Cell(String),
    /// Coordinate with flags, `{"cell": "B2", "serial": true}`
    Detailed {
        cell: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        serial: bool,
    },
}

impl MappingTarget {
    /// Destination coordinate
    pub fn cell(&self) -> &str {
        match self {
            MappingTarget::Cell(cell) => cell,
            MappingTarget::Detailed { cell, .. } => cell,
        }
    }

    /// Whether this entry is explicitly flagged as the serial field
    pub fn is_serial(&self) -> bool {
        matches!(self, MappingTarget::Detailed { serial: true, .. })
    }
}

impl From<&str> for MappingTarget {
    fn from(cell: &str) -> Self {
        MappingTarget::Cell(cell.to_string())
    }
}

/// One template: spreadsheet path and its label → destination mappings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    /// Path as written in the configuration file
    pub path: PathBuf,

    #[serde(default)]
    pub mappings: IndexMap<String, MappingTarget>,

    /// Keys this crate does not interpret, kept for the round trip
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,

    #[serde(skip)]
    resolved: Option<PathBuf>,
}

impl TemplateSpec {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            mappings: IndexMap::new(),
            extra: serde_json::Map::new(),
            resolved: None,
        }
    }

    /// Add a mapping, builder style
    pub fn with_mapping<T: Into<MappingTarget>>(mut self, label: &str, target: T) -> Self {
        self.mappings.insert(label.to_string(), target.into());
        self
    }

    /// Absolute spreadsheet path.
    ///
    /// Paths are anchored at the configuration file's directory on load; a
    /// spec that was never loaded from a file reports its path as written.
    pub fn resolved_path(&self) -> &Path {
        self.resolved.as_deref().unwrap_or(&self.path)
    }

    /// Position of the serial field in `mappings`.
    ///
    /// The first entry flagged `serial` wins; without a flag the last entry
    /// is the serial field.
    pub fn serial_index(&self) -> Option<usize> {
        self.mappings
            .values()
            .position(MappingTarget::is_serial)
            .or_else(|| self.mappings.len().checked_sub(1))
    }

    /// Destination coordinate of the serial field
    pub fn serial_target(&self) -> Option<&str> {
        let index = self.serial_index()?;
        self.mappings.get_index(index).map(|(_, target)| target.cell())
    }

    fn resolve_against(&mut self, base: &Path) {
        self.resolved = Some(if self.path.is_absolute() {
            self.path.clone()
        } else {
            base.join(&self.path)
        });
    }
}

/// Persisted serial counters, base serial → copies generated so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialCounters(IndexMap<String, u64>);

impl SerialCounters {
    /// Count for a base serial, zero when never used
    pub fn get(&self, base: &str) -> u64 {
        self.0.get(base).copied().unwrap_or(0)
    }

    pub fn set(&mut self, base: &str, count: u64) {
        self.0.insert(base.to_string(), count);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Root configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// category → template name → template
    #[serde(default)]
    pub files: IndexMap<String, IndexMap<String, TemplateSpec>>,

    #[serde(default)]
    pub serial_numbers: SerialCounters,

    /// Top-level keys this crate does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Configuration {
    /// Load a configuration file and resolve template paths against its
    /// directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::ConfigNotFound(path.to_path_buf()),
            _ => Error::ConfigRead {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        let mut config: Configuration =
            serde_json::from_str(&text).map_err(|e| Error::ConfigParse {
                path: path.to_path_buf(),
                source: e,
            })?;

        let base = base_directory(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.resolve_paths(&base);

        log::debug!(
            "Loaded {} template(s) from {}",
            config.templates().count(),
            path.display()
        );
        Ok(config)
    }

    /// Parse a configuration from JSON text, resolving relative template
    /// paths against `base`.
    pub fn from_json(text: &str, base: &Path) -> serde_json::Result<Self> {
        let mut config: Configuration = serde_json::from_str(text)?;
        config.resolve_paths(base);
        Ok(config)
    }

    /// Write the configuration back as pretty-printed JSON.
    ///
    /// Template paths are written as they were read.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let write_error = |source: io::Error| Error::ConfigWrite {
            path: path.to_path_buf(),
            source,
        };

        let mut text = serde_json::to_string_pretty(self).map_err(|e| write_error(e.into()))?;
        text.push('\n');
        fs::write(path, text).map_err(write_error)?;

        log::debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Look up a template by category and name
    pub fn template(&self, category: &str, name: &str) -> Result<&TemplateSpec> {
        self.files
            .get(category)
            .and_then(|templates| templates.get(name))
            .ok_or_else(|| Error::TemplateNotFound {
                category: category.to_string(),
                template: name.to_string(),
            })
    }

    /// Every template as `(category, name, spec)`, in file order
    pub fn templates(&self) -> impl Iterator<Item = (&str, &str, &TemplateSpec)> {
        self.files.iter().flat_map(|(category, templates)| {
            templates
                .iter()
                .map(move |(name, spec)| (category.as_str(), name.as_str(), spec))
        })
    }

    /// Category names in file order
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Add or replace a template
    pub fn insert_template(&mut self, category: &str, name: &str, spec: TemplateSpec) {
        self.files
            .entry(category.to_string())
            .or_default()
            .insert(name.to_string(), spec);
    }

    /// Anchor every relative template path at `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        for templates in self.files.values_mut() {
            for spec in templates.values_mut() {
                spec.resolve_against(base);
            }
        }
    }
}

/// Absolute directory holding the configuration file
fn base_directory(config_path: &Path) -> io::Result<PathBuf> {
    let dir = match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::canonicalize(&dir).or_else(|_| std::env::current_dir().map(|cwd| cwd.join(&dir)))
}
