//! Flattening of a configuration tree into addressable entries.
//!
//! Every node, tables included, gets one entry keyed by the `.`-joined path
//! from the root. For `{model: {lr: 0.1}}` that is `model` (the table) and
//! `model.lr` (the leaf).

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::ConfigTree;

/// Separator joining path segments into a flattened key.
pub const FLATTEN_SEPARATOR: &str = ".";

/// One addressable node of a tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlattenedEntry {
    /// Path from the root joined with [`FLATTEN_SEPARATOR`]
    pub key: String,
    /// Number of path segments (top-level keys have depth 1)
    pub depth: usize,
    pub value: Value,
}

impl FlattenedEntry {
    /// Leaves are every node that is not a non-empty table.
    pub fn is_leaf(&self) -> bool {
        !matches!(&self.value, Value::Object(map) if !map.is_empty())
    }
}

/// Flattening errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlattenError {
    #[error(
        "ambiguous key '{key}' under '{parent}': keys must be non-empty and must not contain '{}'",
        FLATTEN_SEPARATOR
    )]
    AmbiguousKey { key: String, parent: String },
}

/// All entries of a flattened tree, keyed by their flattened key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FlatConfig {
    entries: BTreeMap<String, FlattenedEntry>,
}

impl FlatConfig {
    pub fn get(&self, key: &str) -> Option<&FlattenedEntry> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> &BTreeMap<String, FlattenedEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlattenedEntry> {
        self.entries.values()
    }

    /// Depth of the deepest entry.
    pub fn max_depth(&self) -> usize {
        self.iter().map(|e| e.depth).max().unwrap_or(0)
    }

    /// Entries at exactly `depth`.
    pub fn at_depth(&self, depth: usize) -> impl Iterator<Item = &FlattenedEntry> {
        self.iter().filter(move |e| e.depth == depth)
    }

    pub fn leaves(&self) -> impl Iterator<Item = &FlattenedEntry> {
        self.iter().filter(|e| e.is_leaf())
    }

    /// Rebuild a tree from the leaf entries alone.
    pub fn rebuild(&self) -> Value {
        let mut root = Map::new();
        for entry in self.leaves() {
            let segments: Vec<&str> = entry.key.split(FLATTEN_SEPARATOR).collect();
            let Some((last, parents)) = segments.split_last() else {
                continue;
            };
            let mut current = &mut root;
            for segment in parents {
                let child = current
                    .entry((*segment).to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !child.is_object() {
                    *child = Value::Object(Map::new());
                }
                current = match child {
                    Value::Object(map) => map,
                    _ => unreachable!("child was just made a table"),
                };
            }
            current.insert((*last).to_string(), entry.value.clone());
        }
        Value::Object(root)
    }
}

impl<'a> IntoIterator for &'a FlatConfig {
    type Item = (&'a String, &'a FlattenedEntry);
    type IntoIter = std::collections::btree_map::Iter<'a, String, FlattenedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Flatten a composed tree.
pub fn flatten(tree: &ConfigTree) -> Result<FlatConfig, FlattenError> {
    flatten_value(tree.as_value())
}

/// Flatten any value; a non-table root has no addressable nodes.
///
/// All keys are checked before any entry is produced.
pub fn flatten_value(value: &Value) -> Result<FlatConfig, FlattenError> {
    check_keys(value)?;

    let mut entries = BTreeMap::new();
    if let Value::Object(map) = value {
        let mut path = Vec::new();
        walk(map, &mut path, &mut entries);
    }
    Ok(FlatConfig { entries })
}

fn walk<'a>(
    map: &'a Map<String, Value>,
    path: &mut Vec<&'a str>,
    entries: &mut BTreeMap<String, FlattenedEntry>,
) {
    for (key, value) in map {
        path.push(key);
        let flat_key = path.join(FLATTEN_SEPARATOR);
        entries.insert(
            flat_key.clone(),
            FlattenedEntry {
                key: flat_key,
                depth: path.len(),
                value: value.clone(),
            },
        );
        if let Value::Object(child) = value {
            walk(child, path, entries);
        }
        path.pop();
    }
}

/// Check that every key in `value` is non-empty and free of the separator.
pub fn check_keys(value: &Value) -> Result<(), FlattenError> {
    fn visit(map: &Map<String, Value>, parent: &mut Vec<String>) -> Result<(), FlattenError> {
        for (key, value) in map {
            if key.is_empty() || key.contains(FLATTEN_SEPARATOR) {
                return Err(FlattenError::AmbiguousKey {
                    key: key.clone(),
                    parent: parent.join(FLATTEN_SEPARATOR),
                });
            }
            if let Value::Object(child) = value {
                parent.push(key.clone());
                visit(child, parent)?;
                parent.pop();
            }
        }
        Ok(())
    }

    match value {
        Value::Object(map) => visit(map, &mut Vec::new()),
        _ => Ok(()),
    }
}
