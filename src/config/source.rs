//! Loading of configuration documents with provenance.

use std::fs;
use std::path::Path;

use cfgweave_overrides::toml_to_json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::compose::ComposeError;

/// File extension of configuration documents.
pub const CONFIG_EXTENSION: &str = "toml";

/// Role a source played in a composition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    /// The named primary document
    Primary,
    /// A document pulled in by the defaults list
    Default,
    /// A command-line or run-parameter override
    Override,
}

/// A contributing source, in precedence order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for overrides)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for overrides)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// Group key for defaults-list group documents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Override expression as given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl ConfigSource {
    pub(crate) fn file(origin: ConfigOrigin, path: &Path, digest: String) -> Self {
        Self {
            origin,
            path: Some(path.to_string_lossy().to_string()),
            digest: Some(digest),
            group: None,
            expression: None,
        }
    }

    pub(crate) fn expression(raw: &str) -> Self {
        Self {
            origin: ConfigOrigin::Override,
            path: None,
            digest: None,
            group: None,
            expression: Some(raw.to_string()),
        }
    }
}

/// Load and parse a TOML document, returning the table and its digest.
pub(crate) fn load_document(path: &Path) -> Result<(Value, String), ComposeError> {
    let bytes = fs::read(path).map_err(|e| ComposeError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    let contents = String::from_utf8(bytes).map_err(|e| ComposeError::Parse {
        path: path.to_path_buf(),
        message: format!("invalid UTF-8: {}", e),
    })?;

    let table: toml::Table = toml::from_str(&contents).map_err(|e| ComposeError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let value = toml_to_json(toml::Value::Table(table)).ok_or_else(|| ComposeError::Parse {
        path: path.to_path_buf(),
        message: "non-finite floats (inf, nan) have no JSON form".to_string(),
    })?;
    Ok((value, digest))
}

/// Names of the documents directly inside `dir`, sorted, without extension.
pub(crate) fn available_documents(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry.path().extension().and_then(|e| e.to_str()) == Some(CONFIG_EXTENSION)
        })
        .filter_map(|entry| {
            entry
                .path()
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .collect();
    names.sort();
    names
}

/// Path of the document `name` under `dir`.
pub(crate) fn document_path(dir: &Path, name: &str) -> std::path::PathBuf {
    dir.join(format!("{}.{}", name, CONFIG_EXTENSION))
}
