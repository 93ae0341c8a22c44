//! The immutable composed configuration tree.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::flatten::{check_keys, FlattenError, FLATTEN_SEPARATOR};

/// A frozen configuration tree.
///
/// The root is always a table. Clones share the same underlying value, so
/// handing a tree to many pipeline runs never copies it.
#[derive(Clone)]
pub struct ConfigTree {
    root: Arc<Value>,
}

impl ConfigTree {
    /// Freeze a table into a tree.
    ///
    /// Fails if any key could not be addressed unambiguously once flattened.
    pub fn from_value(value: Value) -> Result<Self, TreeError> {
        if !value.is_object() {
            return Err(TreeError::NotATable(type_name(&value)));
        }
        check_keys(&value)?;
        Ok(Self {
            root: Arc::new(value),
        })
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Shared handle to the root value.
    pub fn shared(&self) -> Arc<Value> {
        Arc::clone(&self.root)
    }

    /// True if both trees are the same frozen instance.
    pub fn ptr_eq(a: &ConfigTree, b: &ConfigTree) -> bool {
        Arc::ptr_eq(&a.root, &b.root)
    }

    /// Get a value by dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current: &Value = &self.root;
        for part in path.split(FLATTEN_SEPARATOR) {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(|v| v.as_i64())
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(|v| v.as_bool())
    }

    /// Length of the longest root-to-node path. An empty tree has depth 0.
    pub fn depth(&self) -> usize {
        fn walk(value: &Value) -> usize {
            match value {
                Value::Object(map) => map.values().map(|v| 1 + walk(v)).max().unwrap_or(0),
                _ => 0,
            }
        }
        walk(&self.root)
    }

    /// SHA-256 of the canonical (RFC 8785) JSON form, hex-encoded.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json_canonicalizer::to_vec(self.root.as_ref())?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

impl PartialEq for ConfigTree {
    fn eq(&self, other: &Self) -> bool {
        ConfigTree::ptr_eq(self, other) || self.root == other.root
    }
}

impl fmt::Debug for ConfigTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConfigTree").field(&self.root).finish()
    }
}

impl Serialize for ConfigTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.root.serialize(serializer)
    }
}

/// Errors freezing a tree
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("configuration root must be a table, got {0}")]
    NotATable(&'static str),

    #[error(transparent)]
    Key(#[from] FlattenError),
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "table",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_by_path() {
        let tree = ConfigTree::from_value(json!({"model": {"lr": 0.1, "name": "mlp"}})).unwrap();

        assert_eq!(tree.get_f64("model.lr"), Some(0.1));
        assert_eq!(tree.get_str("model.name"), Some("mlp"));
        assert!(tree.get("model.missing").is_none());
    }

    #[test]
    fn test_depth() {
        assert_eq!(ConfigTree::from_value(json!({})).unwrap().depth(), 0);
        assert_eq!(ConfigTree::from_value(json!({"a": 1})).unwrap().depth(), 1);
        let tree = ConfigTree::from_value(json!({"a": {"b": {"c": 1}}, "d": 2})).unwrap();
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn test_rejects_non_table_root() {
        assert!(matches!(
            ConfigTree::from_value(json!([1, 2])),
            Err(TreeError::NotATable("array"))
        ));
    }

    #[test]
    fn test_rejects_dotted_key() {
        let err = ConfigTree::from_value(json!({"model": {"v1.2": 1}})).unwrap_err();
        assert!(matches!(err, TreeError::Key(FlattenError::AmbiguousKey { .. })));
    }

    #[test]
    fn test_clone_shares_root() {
        let tree = ConfigTree::from_value(json!({"a": 1})).unwrap();
        let other = tree.clone();
        assert!(ConfigTree::ptr_eq(&tree, &other));
    }

    #[test]
    fn test_digest_ignores_key_order() {
        let a = ConfigTree::from_value(json!({"x": 1, "y": {"b": 2, "a": 1}})).unwrap();
        let b = ConfigTree::from_value(
            serde_json::from_str(r#"{"y": {"a": 1, "b": 2}, "x": 1}"#).unwrap(),
        )
        .unwrap();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_eq!(a.digest().unwrap().len(), 64);
    }
}
