//! Defaults list of a primary document.
//!
//! ```toml
//! defaults = [{ model = "small" }, "common", "_self_"]
//! ```
//!
//! Group items load `<root>/<group>/<option>.toml` under the group key,
//! plain names load `<root>/<name>.toml` at the root, and `_self_` marks
//! where the primary document's own body is merged (last if absent).

use std::path::{Component, Path};

use serde_json::Value;

use super::compose::ComposeError;

/// Key holding the defaults list in a primary document.
pub const DEFAULTS_KEY: &str = "defaults";

/// Marker for the primary document's own body.
pub const SELF_MARKER: &str = "_self_";

/// One entry of a defaults list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultsItem {
    /// The primary document's own body
    SelfBody,
    /// `{ group = "option" }`
    Group { group: String, option: String },
    /// A document merged at the root
    Document(String),
}

/// True if `name` resolves inside the directory it is joined to: relative,
/// no `.` or `..` components.
pub(crate) fn is_contained_name(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

impl DefaultsItem {
    /// Key path a group document is placed under (`db/engine` -> `db.engine`).
    pub fn group_path(group: &str) -> Vec<&str> {
        group.split('/').filter(|s| !s.is_empty()).collect()
    }
}

/// Defaults list with `_self_` guaranteed present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DefaultsList {
    items: Vec<DefaultsItem>,
}

impl DefaultsList {
    /// Parse the `defaults` value of the document at `path`.
    pub fn parse(raw: Option<Value>, path: &Path) -> Result<Self, ComposeError> {
        let invalid = |message: String| ComposeError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let entries = match raw {
            None => Vec::new(),
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return Err(invalid(format!(
                    "'{}' must be an array, got {}",
                    DEFAULTS_KEY,
                    super::tree::type_name(&other)
                )))
            }
        };

        let mut items = Vec::with_capacity(entries.len() + 1);
        for entry in entries {
            let item = match entry {
                Value::String(s) if s == SELF_MARKER => DefaultsItem::SelfBody,
                Value::String(s) if is_contained_name(&s) => DefaultsItem::Document(s),
                Value::Object(map) if map.len() == 1 => {
                    let (group, option) = map.into_iter().next().ok_or_else(|| {
                        invalid("empty group entry in defaults list".to_string())
                    })?;
                    let option = match option {
                        Value::String(option) if is_contained_name(&option) => option,
                        other => {
                            return Err(invalid(format!(
                                "group '{}' must select an option name, got {}",
                                group,
                                super::tree::type_name(&other)
                            )))
                        }
                    };
                    if !is_contained_name(&group) {
                        return Err(invalid(format!(
                            "group name '{}' must be a relative directory name",
                            group
                        )));
                    }
                    DefaultsItem::Group { group, option }
                }
                other => {
                    return Err(invalid(format!(
                        "unsupported defaults entry: {}",
                        other
                    )))
                }
            };
            items.push(item);
        }

        if !items.contains(&DefaultsItem::SelfBody) {
            items.push(DefaultsItem::SelfBody);
        }

        Ok(Self { items })
    }

    pub fn items(&self) -> &[DefaultsItem] {
        &self.items
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item, DefaultsItem::Group { group: g, .. } if g == group))
    }

    /// Change the option selected for `group`. Returns false if the group is
    /// not in the list.
    pub fn select(&mut self, group: &str, option: &str) -> bool {
        let mut found = false;
        for item in &mut self.items {
            if let DefaultsItem::Group { group: g, option: o } = item {
                if g == group {
                    *o = option.to_string();
                    found = true;
                }
            }
        }
        found
    }

    /// Add a group just before `_self_`.
    pub fn append_group(&mut self, group: &str, option: &str) {
        let at = self
            .items
            .iter()
            .position(|item| *item == DefaultsItem::SelfBody)
            .unwrap_or(self.items.len());
        self.items.insert(
            at,
            DefaultsItem::Group {
                group: group.to_string(),
                option: option.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<DefaultsList, ComposeError> {
        DefaultsList::parse(Some(value), Path::new("config.toml"))
    }

    #[test]
    fn test_missing_defaults_is_self_only() {
        let list = DefaultsList::parse(None, Path::new("config.toml")).unwrap();
        assert_eq!(list.items(), &[DefaultsItem::SelfBody]);
    }

    #[test]
    fn test_self_appended_when_absent() {
        let list = parse(json!([{"model": "small"}, "common"])).unwrap();
        assert_eq!(
            list.items(),
            &[
                DefaultsItem::Group {
                    group: "model".into(),
                    option: "small".into()
                },
                DefaultsItem::Document("common".into()),
                DefaultsItem::SelfBody,
            ]
        );
    }

    #[test]
    fn test_explicit_self_position_kept() {
        let list = parse(json!(["_self_", {"model": "small"}])).unwrap();
        assert_eq!(list.items()[0], DefaultsItem::SelfBody);
        assert_eq!(list.items().len(), 2);
    }

    #[test]
    fn test_invalid_entries() {
        assert!(parse(json!("model")).is_err());
        assert!(parse(json!([1])).is_err());
        assert!(parse(json!([{"model": 3}])).is_err());
        assert!(parse(json!([{"a": "x", "b": "y"}])).is_err());
        assert!(parse(json!([""])).is_err());
    }

    #[test]
    fn test_names_must_stay_inside_root() {
        assert!(parse(json!(["../common"])).is_err());
        assert!(parse(json!(["/etc/common"])).is_err());
        assert!(parse(json!([{"model": "../secret"}])).is_err());
        assert!(parse(json!([{"../model": "small"}])).is_err());
        assert!(parse(json!([{"db/engine": "pg"}, "shared/common"])).is_ok());
    }

    #[test]
    fn test_is_contained_name() {
        assert!(is_contained_name("small"));
        assert!(is_contained_name("db/engine"));
        assert!(!is_contained_name(""));
        assert!(!is_contained_name(".."));
        assert!(!is_contained_name("a/../b"));
        assert!(!is_contained_name("./small"));
        assert!(!is_contained_name("/abs"));
    }

    #[test]
    fn test_select_and_append() {
        let mut list = parse(json!([{"model": "small"}])).unwrap();

        assert!(list.select("model", "large"));
        assert!(!list.select("optimizer", "adam"));
        list.append_group("optimizer", "adam");

        assert!(list.has_group("optimizer"));
        assert_eq!(
            list.items()[0],
            DefaultsItem::Group {
                group: "model".into(),
                option: "large".into()
            }
        );
        assert_eq!(list.items()[2], DefaultsItem::SelfBody);
    }

    #[test]
    fn test_group_path() {
        assert_eq!(DefaultsItem::group_path("db/engine"), vec!["db", "engine"]);
    }
}
