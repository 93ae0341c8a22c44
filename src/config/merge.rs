//! Layer merge logic
//!
//! Layers are merged in precedence order with:
//! - Tables: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::{Map, Value};

/// Deep merge two config values, `overlay` taking precedence.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }

        // Arrays are leaves: no concatenation
        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence).
///
/// An empty layer list yields an empty table.
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers
        .into_iter()
        .fold(Value::Object(Map::new()), deep_merge)
}

/// Wrap `value` so that it sits at `path` inside an otherwise empty table.
///
/// Used to place a config group document under its group key.
pub fn nest_under(path: &[&str], value: Value) -> Value {
    path.iter().rev().fold(value, |inner, key| {
        let mut map = Map::new();
        map.insert((*key).to_string(), inner);
        Value::Object(map)
    })
}
