//! Shared fixtures for integration tests
//!
//! `fixtures/conf` is a layered configuration root:
//! - `train.toml` selects `model/mlp` and `optimizer/sgd`
//! - `simple.toml` has no defaults list

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cfgweave::config::{CompositionGuard, SearchPath};
use cfgweave::hooks::OVERRIDES_PARAM;
use cfgweave::ConfigHooks;
use serde_json::{json, Value};

/// Path to the fixture configuration root
pub fn conf_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/conf")
}

/// Hooks with their own guard and search path, rooted at the fixtures.
pub fn isolated_hooks(config_name: &str) -> ConfigHooks {
    ConfigHooks::with_state(
        config_name,
        Arc::new(CompositionGuard::default()),
        Arc::new(SearchPath::new()),
    )
    .with_config_root(conf_root())
}

/// Run parameters carrying an override string.
pub fn params_with_overrides(raw: &str) -> BTreeMap<String, Value> {
    let mut params = BTreeMap::new();
    params.insert(OVERRIDES_PARAM.to_string(), json!(raw));
    params
}
