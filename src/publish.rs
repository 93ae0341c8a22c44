//! Publication of a composed tree into a run's registry.

use std::sync::Arc;

use cfgweave_catalog::{Entry, Registry, RegistryError};

use crate::config::ConfigTree;
use crate::flatten::FlatConfig;

/// Registry name of the whole tree.
pub const WHOLE_TREE_ENTRY: &str = "config";

/// Prefix of per-node registry names.
pub const ENTRY_PREFIX: &str = "cfg:";

/// Registry name for a flattened key.
pub fn entry_name(key: &str) -> String {
    format!("{}{}", ENTRY_PREFIX, key)
}

/// Every registry entry a publication writes, whole tree first.
pub fn build_batch(tree: &ConfigTree, flat: &FlatConfig) -> Vec<(String, Entry)> {
    let mut batch = Vec::with_capacity(flat.len() + 1);
    batch.push((WHOLE_TREE_ENTRY.to_string(), tree.shared()));
    for (key, entry) in flat {
        batch.push((entry_name(key), Arc::new(entry.value.clone())));
    }
    batch
}

/// Write the tree and its flattened entries to `registry`.
///
/// The full batch is built before the registry is touched and is handed
/// over in a single write. Entries outside `config` and `cfg:*` are left as
/// they are.
pub fn publish(
    registry: &dyn Registry,
    tree: &ConfigTree,
    flat: &FlatConfig,
) -> Result<usize, RegistryError> {
    let batch = build_batch(tree, flat);
    let count = batch.len();
    registry.insert_all(batch)?;
    tracing::info!(entries = count, "configuration published to registry");
    Ok(count)
}
