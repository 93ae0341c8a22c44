//! Configuration composition
//!
//! A tree is composed from:
//! 1. The primary document `<root>/<name>.toml`
//! 2. The documents named by its defaults list
//! 3. Override expressions, applied in order
//!
//! and is composed at most once per process through [`CompositionGuard`].

mod apply;
mod compose;
mod defaults;
mod guard;
mod merge;
mod search;
mod source;
mod tree;

pub use compose::{ComposeError, Composer, Composition};
pub use defaults::{DefaultsItem, DefaultsList, DEFAULTS_KEY, SELF_MARKER};
pub use guard::{Composed, CompositionGuard, GuardPolicy, GuardStatus};
pub use merge::{deep_merge, merge_layers, nest_under};
pub use search::{resolve_root, resolve_root_with, SearchPath, CONF_ROOT_ENV};
pub use source::{ConfigOrigin, ConfigSource, CONFIG_EXTENSION};
pub use tree::{ConfigTree, TreeError};
