//! Application of value overrides to a working copy of the tree.
//!
//! Tables are subtrees; every other value, arrays and null included, is a
//! leaf. Leaf-to-leaf changes of type are accepted. Turning a subtree into a
//! leaf, a leaf into a subtree, or creating a child below a leaf is rejected.

use cfgweave_overrides::{Override, OverrideKind, PATH_SEPARATOR};
use serde_json::{Map, Value};

use super::compose::ComposeError;
use super::tree::type_name;

/// Apply one override in place.
pub(crate) fn apply_override(tree: &mut Value, over: &Override) -> Result<(), ComposeError> {
    let Some((last, parents)) = over.path.split_last() else {
        return Err(invalid(over, "empty path".to_string()));
    };

    let mut current = tree;
    for (depth, segment) in parents.iter().enumerate() {
        let map = current
            .as_object_mut()
            .ok_or_else(|| invalid(over, "override target is not a table".to_string()))?;
        let child = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !child.is_object() {
            return Err(invalid(
                over,
                format!(
                    "'{}' is a {} and cannot hold '{}'",
                    over.path[..=depth].join(PATH_SEPARATOR),
                    type_name(child),
                    over.path[depth + 1..].join(PATH_SEPARATOR)
                ),
            ));
        }
        current = child;
    }

    let map = current
        .as_object_mut()
        .ok_or_else(|| invalid(over, "override target is not a table".to_string()))?;
    let replacement = over.literal();

    match map.get(last) {
        Some(_) if over.kind == OverrideKind::Add => {
            return Err(invalid(
                over,
                "path already exists; drop the '+' prefix to replace it".to_string(),
            ));
        }
        Some(existing) if existing.is_object() != replacement.is_object() => {
            return Err(invalid(
                over,
                format!(
                    "would replace a {} with a {}",
                    type_name(existing),
                    type_name(&replacement)
                ),
            ));
        }
        _ => {}
    }

    map.insert(last.clone(), replacement);
    Ok(())
}

fn invalid(over: &Override, reason: String) -> ComposeError {
    ComposeError::InvalidOverridePath {
        path: over.key(),
        reason,
    }
}
