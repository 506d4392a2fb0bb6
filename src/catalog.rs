mod xml_config;
mod yaml_config;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Ordered set of color-space names declared by one configuration document.
///
/// An empty catalog is a successful load of a document that declares nothing;
/// load failures are reported through [`LoadError`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorspaceCatalog {
    source_path: PathBuf,
    names: Vec<String>,
    #[serde(skip)]
    source_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigDocumentKind {
    Xml,
    Yaml,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("config '{path}' was not found or is unreadable")]
    NotFound { path: String },
    #[error("failed to parse config '{path}': {detail}")]
    ParseFailure { path: String, detail: String },
}

impl ColorspaceCatalog {
    pub fn empty() -> Self {
        Self {
            source_path: PathBuf::new(),
            names: Vec::new(),
            source_text: String::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let raw = fs::read_to_string(path).map_err(|error| match error.kind() {
            io::ErrorKind::InvalidData => LoadError::ParseFailure {
                path: path.display().to_string(),
                detail: error.to_string(),
            },
            _ => LoadError::NotFound {
                path: path.display().to_string(),
            },
        })?;
        let catalog = Self::from_document(path, raw)?;
        debug!(
            config = %path.display(),
            colorspaces = catalog.names.len(),
            "loaded colorspace catalog"
        );
        Ok(catalog)
    }

    pub fn from_document(path: &Path, raw: String) -> Result<Self, LoadError> {
        let declared = match detect_document_kind(raw.as_str()) {
            ConfigDocumentKind::Xml => xml_config::colorspace_names(raw.as_str()),
            ConfigDocumentKind::Yaml => yaml_config::colorspace_names(raw.as_str()),
        }
        .map_err(|detail| LoadError::ParseFailure {
            path: path.display().to_string(),
            detail,
        })?;

        Ok(Self {
            source_path: path.to_path_buf(),
            names: dedupe_first_occurrence(declared),
            source_text: raw,
        })
    }

    pub fn source_path(&self) -> &Path {
        self.source_path.as_path()
    }

    pub fn names(&self) -> &[String] {
        self.names.as_slice()
    }

    pub fn source_text(&self) -> &str {
        self.source_text.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|known| known == name)
    }
}

impl Default for ColorspaceCatalog {
    fn default() -> Self {
        Self::empty()
    }
}

pub fn detect_document_kind(raw: &str) -> ConfigDocumentKind {
    let first = raw
        .trim_start_matches('\u{feff}')
        .chars()
        .find(|ch| !ch.is_whitespace());
    if first == Some('<') {
        ConfigDocumentKind::Xml
    } else {
        ConfigDocumentKind::Yaml
    }
}

fn dedupe_first_occurrence(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(names.len());
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
