//! Named-entry registry shared by the stages of a pipeline run.
//!
//! The registry is owned by the runner; configuration publishing only ever
//! writes through [`Registry::insert_all`], which replaces entries of the
//! same name and leaves every other entry alone.

mod memory;

pub use memory::MemoryCatalog;

use std::sync::Arc;

use serde_json::Value;

/// A value stored in the registry.
pub type Entry = Arc<Value>;

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid entry name '{0}'")]
    InvalidName(String),

    #[error("registry lock poisoned")]
    Poisoned,
}

/// Store of named values read by pipeline stages.
pub trait Registry: Send + Sync {
    /// Look up an entry by name.
    fn get(&self, name: &str) -> Option<Entry>;

    /// Insert every entry of `batch`, replacing existing entries of the same
    /// name.
    ///
    /// Readers observe either none or all of the batch.
    fn insert_all(&self, batch: Vec<(String, Entry)>) -> Result<(), RegistryError>;

    /// Names of all entries, sorted.
    fn names(&self) -> Vec<String>;

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn len(&self) -> usize {
        self.names().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a single entry.
    fn insert(&self, name: &str, value: Value) -> Result<(), RegistryError> {
        self.insert_all(vec![(name.to_string(), Arc::new(value))])
    }
}
