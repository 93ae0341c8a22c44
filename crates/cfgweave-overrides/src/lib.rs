//! Parser for configuration override expressions.
//!
//! Overrides are written `dotted.path=value`, optionally prefixed with `+`
//! to require that the path does not exist yet. They arrive either as a list
//! of CLI-style tokens or as one space-separated string.

mod parser;
mod split;
mod value;

pub use parser::{parse, parse_str, Override, OverrideError, OverrideKind, PATH_SEPARATOR};
pub use split::split_overrides;
pub use value::{parse_literal, toml_to_json};
