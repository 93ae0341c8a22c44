//! Composition of a configuration tree from a primary document, its
//! defaults list and a sequence of overrides.

use std::path::{Path, PathBuf};

use cfgweave_overrides::{Override, OverrideKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::apply::apply_override;
use super::defaults::{is_contained_name, DefaultsItem, DefaultsList, DEFAULTS_KEY};
use super::merge::{merge_layers, nest_under};
use super::source::{
    available_documents, document_path, load_document, ConfigOrigin, ConfigSource,
    CONFIG_EXTENSION,
};
use super::tree::{ConfigTree, TreeError};
use crate::flatten::FlattenError;

/// Composes trees from a configuration root directory.
#[derive(Debug, Clone)]
pub struct Composer {
    root: PathBuf,
    config_name: String,
}

/// A composed tree and where it came from
#[derive(Debug, Clone, Serialize)]
pub struct Composition {
    pub config_name: String,
    /// Configuration root the tree was composed from
    pub root: PathBuf,
    pub tree: ConfigTree,
    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
    /// Override expressions applied, as given
    pub overrides: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Composer {
    /// `config_name` may include the `.toml` extension.
    pub fn new(root: impl Into<PathBuf>, config_name: &str) -> Self {
        let suffix = format!(".{}", CONFIG_EXTENSION);
        let config_name = config_name
            .strip_suffix(suffix.as_str())
            .unwrap_or(config_name)
            .to_string();
        Self {
            root: root.into(),
            config_name,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_name(&self) -> &str {
        &self.config_name
    }

    /// Load the primary document, merge its defaults list and apply
    /// `overrides` in order.
    pub fn compose(&self, overrides: &[Override]) -> Result<Composition, ComposeError> {
        let primary_path = document_path(&self.root, &self.config_name);
        if !primary_path.is_file() {
            return Err(ComposeError::ConfigNotFound {
                name: self.config_name.clone(),
                root: self.root.clone(),
                available: available_documents(&self.root),
            });
        }

        let (mut body, primary_digest) = load_document(&primary_path)?;
        let mut defaults = DefaultsList::parse(take_defaults(&mut body), &primary_path)?;

        // Group selections change the defaults list; everything else edits values.
        let mut value_overrides = Vec::new();
        for over in overrides {
            let key = over.key();
            if over.is_bare_word() && defaults.has_group(&key) {
                if over.kind == OverrideKind::Add {
                    return Err(ComposeError::InvalidOverridePath {
                        path: key,
                        reason: "group is already in the defaults list".to_string(),
                    });
                }
                check_option(&key, &over.value)?;
                defaults.select(&key, &over.value);
            } else if over.kind == OverrideKind::Add
                && over.is_bare_word()
                && is_contained_name(&key)
                && self.root.join(&key).is_dir()
            {
                check_option(&key, &over.value)?;
                defaults.append_group(&key, &over.value);
            } else {
                value_overrides.push(over);
            }
        }

        let mut layers = Vec::new();
        let mut sources = Vec::new();
        let mut primary_body = Some(body);
        for item in defaults.items() {
            match item {
                DefaultsItem::SelfBody => {
                    if let Some(body) = primary_body.take() {
                        layers.push(body);
                        sources.push(ConfigSource::file(
                            ConfigOrigin::Primary,
                            &primary_path,
                            primary_digest.clone(),
                        ));
                    }
                }
                DefaultsItem::Document(name) => {
                    let (value, source) = self.load_default(&self.root, name)?;
                    layers.push(value);
                    sources.push(source);
                }
                DefaultsItem::Group { group, option } => {
                    let (value, mut source) = self.load_default(&self.root.join(group), option)?;
                    layers.push(nest_under(&DefaultsItem::group_path(group), value));
                    source.group = Some(group.clone());
                    sources.push(source);
                }
            }
        }

        let mut merged = merge_layers(layers);
        for over in &value_overrides {
            apply_override(&mut merged, over)?;
            sources.push(ConfigSource::expression(&over.raw));
        }

        let tree = ConfigTree::from_value(merged)?;
        tracing::info!(
            config = %self.config_name,
            root = %self.root.display(),
            sources = sources.len(),
            overrides = overrides.len(),
            "configuration composed"
        );

        Ok(Composition {
            config_name: self.config_name.clone(),
            root: self.root.clone(),
            tree,
            sources,
            overrides: overrides.iter().map(|o| o.raw.clone()).collect(),
            created_at: Utc::now(),
        })
    }

    fn load_default(&self, dir: &Path, name: &str) -> Result<(Value, ConfigSource), ComposeError> {
        let path = document_path(dir, name);
        if !path.is_file() {
            let label = dir
                .strip_prefix(&self.root)
                .ok()
                .filter(|rel| !rel.as_os_str().is_empty())
                .map(|rel| format!("{}/{}", rel.display(), name))
                .unwrap_or_else(|| name.to_string());
            return Err(ComposeError::ConfigNotFound {
                name: label,
                root: self.root.clone(),
                available: available_documents(dir),
            });
        }

        let (mut value, digest) = load_document(&path)?;
        if take_defaults(&mut value).is_some() {
            return Err(ComposeError::Parse {
                path,
                message: format!("nested '{}' lists are not supported", DEFAULTS_KEY),
            });
        }
        tracing::debug!(path = %path.display(), "loaded default document");
        Ok((value, ConfigSource::file(ConfigOrigin::Default, &path, digest)))
    }
}

fn check_option(group: &str, option: &str) -> Result<(), ComposeError> {
    if is_contained_name(option) {
        Ok(())
    } else {
        Err(ComposeError::InvalidOverridePath {
            path: group.to_string(),
            reason: format!("option '{}' must name a document inside the group", option),
        })
    }
}

fn take_defaults(document: &mut Value) -> Option<Value> {
    document.as_object_mut().and_then(|map: &mut Map<String, Value>| map.remove(DEFAULTS_KEY))
}

fn available_hint(available: &[String]) -> String {
    if available.is_empty() {
        String::new()
    } else {
        format!(" (available: {})", available.join(", "))
    }
}

/// Composition errors
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("config '{name}' not found under {}{}", .root.display(), available_hint(.available))]
    ConfigNotFound {
        name: String,
        root: PathBuf,
        available: Vec<String>,
    },

    #[error("invalid override path '{path}': {reason}")]
    InvalidOverridePath { path: String, reason: String },

    #[error("config search path already initialized at {}", .0.display())]
    AlreadyInitialized(PathBuf),

    #[error("config root not set: pass --config-root or set {0}")]
    MissingConfigRoot(String),

    #[error("overrides {requested:?} differ from {composed:?} already composed in this process")]
    OverridesConflict {
        requested: Vec<String>,
        composed: Vec<String>,
    },

    #[error("config '{requested}' requested but '{composed}' is already composed in this process")]
    ConfigConflict { requested: String, composed: String },

    #[error("failed to read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Flatten(#[from] FlattenError),

    #[error("invalid composed tree: {0}")]
    Tree(String),
}

impl From<TreeError> for ComposeError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::Key(e) => ComposeError::Flatten(e),
            other => ComposeError::Tree(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn overrides(raw: &[&str]) -> Vec<Override> {
        cfgweave_overrides::parse(raw).unwrap()
    }

    fn layered_root() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "config.toml",
            r#"
defaults = [{ model = "small" }, "common"]
seed = 42

[model]
dropout = 0.1
"#,
        );
        write(dir.path(), "common.toml", "seed = 1\nlog_every = 10\n");
        write(dir.path(), "model/small.toml", "name = \"small\"\ndepth = 2\ndropout = 0.0\n");
        write(dir.path(), "model/large.toml", "name = \"large\"\ndepth = 12\n");
        write(dir.path(), "optimizer/adam.toml", "lr = 0.001\n");
        dir
    }

    #[test]
    fn test_compose_plain_document() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "train.toml", "[model]\nlr = 0.1\ndepth = 3\n");

        let composer = Composer::new(dir.path(), "train.toml");
        let composition = composer.compose(&overrides(&["model.lr=0.05"])).unwrap();

        assert_eq!(composer.config_name(), "train");
        assert_eq!(composition.tree.as_value(), &json!({"model": {"lr": 0.05, "depth": 3}}));
        assert_eq!(composition.overrides, vec!["model.lr=0.05"]);
        assert_eq!(composition.sources.len(), 2);
        assert_eq!(composition.sources[0].origin, ConfigOrigin::Primary);
        assert_eq!(composition.sources[1].origin, ConfigOrigin::Override);
    }

    #[test]
    fn test_defaults_list_layering() {
        let dir = layered_root();
        let composition = Composer::new(dir.path(), "config").compose(&[]).unwrap();

        assert_eq!(
            composition.tree.as_value(),
            &json!({
                "seed": 42,
                "log_every": 10,
                "model": {"name": "small", "depth": 2, "dropout": 0.1}
            })
        );
        let origins: Vec<_> = composition.sources.iter().map(|s| s.origin).collect();
        assert_eq!(
            origins,
            vec![ConfigOrigin::Default, ConfigOrigin::Default, ConfigOrigin::Primary]
        );
        assert_eq!(composition.sources[0].group.as_deref(), Some("model"));
    }

    #[test]
    fn test_self_first_lets_defaults_win() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "config.toml", "defaults = [\"_self_\", \"common\"]\nseed = 42\n");
        write(dir.path(), "common.toml", "seed = 1\n");

        let composition = Composer::new(dir.path(), "config").compose(&[]).unwrap();
        assert_eq!(composition.tree.get_i64("seed"), Some(1));
    }

    #[test]
    fn test_group_selection_override() {
        let dir = layered_root();
        let composition = Composer::new(dir.path(), "config")
            .compose(&overrides(&["model=large", "model.depth=24"]))
            .unwrap();

        assert_eq!(composition.tree.get_str("model.name"), Some("large"));
        assert_eq!(composition.tree.get_i64("model.depth"), Some(24));
        assert_eq!(composition.tree.get_f64("model.dropout"), Some(0.1));
    }

    #[test]
    fn test_group_option_cannot_leave_group_directory() {
        let dir = layered_root();
        write(dir.path(), "secret.toml", "token = \"abc\"\n");
        let composer = Composer::new(dir.path(), "config");

        for raw in ["model=../secret", "+optimizer=../secret", "model=./small"] {
            let err = composer.compose(&overrides(&[raw])).unwrap_err();
            assert!(
                matches!(err, ComposeError::InvalidOverridePath { .. }),
                "{}: {}",
                raw,
                err
            );
        }
    }

    #[test]
    fn test_add_group_override() {
        let dir = layered_root();
        let composition = Composer::new(dir.path(), "config")
            .compose(&overrides(&["+optimizer=adam"]))
            .unwrap();

        assert_eq!(composition.tree.get_f64("optimizer.lr"), Some(0.001));
    }

    #[test]
    fn test_add_existing_group_rejected() {
        let dir = layered_root();
        let err = Composer::new(dir.path(), "config")
            .compose(&overrides(&["+model=large"]))
            .unwrap_err();
        assert!(matches!(err, ComposeError::InvalidOverridePath { .. }));
    }

    #[test]
    fn test_missing_primary() {
        let dir = layered_root();
        let err = Composer::new(dir.path(), "nope").compose(&[]).unwrap_err();

        match &err {
            ComposeError::ConfigNotFound { name, available, .. } => {
                assert_eq!(name, "nope");
                assert_eq!(available, &vec!["common".to_string(), "config".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("available: common, config"));
    }

    #[test]
    fn test_missing_group_option() {
        let dir = layered_root();
        let err = Composer::new(dir.path(), "config")
            .compose(&overrides(&["model=huge"]))
            .unwrap_err();

        match err {
            ComposeError::ConfigNotFound { name, available, .. } => {
                assert_eq!(name, "model/huge");
                assert_eq!(available, vec!["large".to_string(), "small".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dotted_key_fails_composition() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "config.toml", "[model]\n\"v1.2\" = true\n");

        let err = Composer::new(dir.path(), "config").compose(&[]).unwrap_err();
        assert!(matches!(err, ComposeError::Flatten(FlattenError::AmbiguousKey { .. })));
    }

    #[test]
    fn test_nested_defaults_rejected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "config.toml", "defaults = [\"common\"]\n");
        write(dir.path(), "common.toml", "defaults = [\"other\"]\n");

        let err = Composer::new(dir.path(), "config").compose(&[]).unwrap_err();
        assert!(matches!(err, ComposeError::Parse { .. }));
    }

    #[test]
    fn test_type_changing_override_rejected() {
        let dir = layered_root();
        let err = Composer::new(dir.path(), "config")
            .compose(&overrides(&["model=3"]))
            .unwrap_err();
        assert!(matches!(err, ComposeError::InvalidOverridePath { .. }));
    }
}
