//! Override expression parser.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::split::split_overrides;
use crate::value::{is_bare_word, parse_literal};

/// Separator between path segments in an override key.
pub const PATH_SEPARATOR: &str = ".";

/// How an override treats the existing value at its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideKind {
    /// Replace the value, creating the path if it is missing.
    Set,
    /// `+path=value`: the path must not exist yet.
    Add,
}

/// A single parsed `path=value` instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    /// The expression as given, trimmed.
    pub raw: String,
    pub kind: OverrideKind,
    /// Path segments from the root.
    pub path: Vec<String>,
    /// Unparsed right-hand side.
    pub value: String,
}

impl Override {
    /// Dotted form of the path.
    pub fn key(&self) -> String {
        self.path.join(PATH_SEPARATOR)
    }

    /// The right-hand side read as a typed literal.
    pub fn literal(&self) -> serde_json::Value {
        parse_literal(&self.value)
    }

    /// True when the value is an unquoted word such as `large`.
    ///
    /// Group selections (`model=large`) are only recognised for bare words.
    pub fn is_bare_word(&self) -> bool {
        is_bare_word(&self.value)
    }
}

/// Override parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OverrideError {
    #[error("malformed override '{raw}': {reason}")]
    Malformed { raw: String, reason: String },
}

impl OverrideError {
    fn malformed(raw: &str, reason: impl Into<String>) -> Self {
        OverrideError::Malformed {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

fn expression_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^(?P<add>\+)?(?P<key>[^=]*)=(?P<value>.*)$")
            .expect("override expression regex is valid")
    })
}

/// Parse a list of override expressions.
///
/// Either every entry parses or the first malformed one is reported; nothing
/// is returned for a partially valid list.
pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Override>, OverrideError> {
    raw.iter().map(|s| parse_one(s.as_ref())).collect()
}

/// Split a space-separated override string and parse every token.
pub fn parse_str(raw: &str) -> Result<Vec<Override>, OverrideError> {
    let tokens = split_overrides(raw)?;
    parse(&tokens)
}

fn parse_one(raw: &str) -> Result<Override, OverrideError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(OverrideError::malformed(raw, "empty expression"));
    }

    let caps = expression_re()
        .captures(trimmed)
        .ok_or_else(|| OverrideError::malformed(trimmed, "expected 'path=value'"))?;

    let kind = if caps.name("add").is_some() {
        OverrideKind::Add
    } else {
        OverrideKind::Set
    };
    let key = caps.name("key").map(|m| m.as_str().trim()).unwrap_or_default();
    let value = caps.name("value").map(|m| m.as_str().trim()).unwrap_or_default();

    if key.is_empty() {
        return Err(OverrideError::malformed(trimmed, "empty path"));
    }

    let mut path = Vec::new();
    for segment in key.split(PATH_SEPARATOR) {
        if segment.is_empty() {
            return Err(OverrideError::malformed(trimmed, "empty path segment"));
        }
        if segment.chars().any(char::is_whitespace) {
            return Err(OverrideError::malformed(
                trimmed,
                format!("whitespace in path segment '{}'", segment),
            ));
        }
        path.push(segment.to_string());
    }

    Ok(Override {
        raw: trimmed.to_string(),
        kind,
        path,
        value: value.to_string(),
    })
}
