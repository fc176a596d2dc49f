//! Reads reference tables, engine configuration and order rows from disk.

use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;

use crate::types::{PackingError, Result};

/// Text format of a document on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// `.yaml` and `.yml` read as YAML; any other extension as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => DocumentFormat::Yaml,
            _ => DocumentFormat::Json,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Yaml => write!(f, "YAML"),
            DocumentFormat::Json => write!(f, "JSON"),
        }
    }
}

/// Deserializes `content`; `origin` names the source in error messages.
pub fn parse_document<T: DeserializeOwned>(
    content: &str,
    format: DocumentFormat,
    origin: &str,
) -> Result<T> {
    let parsed = match format {
        DocumentFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        DocumentFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| PackingError::Parse {
        origin: origin.to_string(),
        format,
        message,
    })
}

/// Reads a YAML or JSON file, picking the format from its extension.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let origin = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| PackingError::Read {
        path: origin.clone(),
        source,
    })?;
    parse_document(&content, DocumentFormat::from_path(path), &origin)
}
