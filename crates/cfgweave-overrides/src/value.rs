//! Typing of override right-hand sides.
//!
//! A value reads the way a TOML inline value would: `3`, `0.5`, `true`,
//! `"text"`, `[1, 2]`, `{ a = 1 }`. `null` is JSON null. Anything that does
//! not parse as TOML is kept verbatim as a string.

use serde_json::{Map, Number, Value};

/// Parse an override value literal.
pub fn parse_literal(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::String(String::new());
    }
    if raw == "null" {
        return Value::Null;
    }

    let document = format!("v = {}", raw);
    match toml::from_str::<toml::Table>(&document) {
        Ok(mut table) if table.len() == 1 => match table.remove("v").and_then(toml_to_json) {
            Some(value) => value,
            None => Value::String(raw.to_string()),
        },
        _ => Value::String(raw.to_string()),
    }
}

/// True for an unquoted single word that reads as a plain string.
pub(crate) fn is_bare_word(raw: &str) -> bool {
    let raw = raw.trim();
    !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '/' | '.'))
        && matches!(parse_literal(raw), Value::String(_))
}

/// Convert a TOML value into a JSON value.
///
/// Datetimes become strings. Returns `None` if the value holds a non-finite
/// float anywhere, since JSON has no form for it; override literals then stay
/// text and configuration documents are rejected.
pub fn toml_to_json(value: toml::Value) -> Option<Value> {
    Some(match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => Value::Number(Number::from_f64(f)?),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(
            arr.into_iter()
                .map(toml_to_json)
                .collect::<Option<Vec<_>>>()?,
        ),
        toml::Value::Table(table) => {
            let mut map = Map::new();
            for (k, v) in table {
                map.insert(k, toml_to_json(v)?);
            }
            Value::Object(map)
        }
    })
}
