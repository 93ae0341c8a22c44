//! In-memory registry.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::{Entry, Registry, RegistryError};

/// Registry backed by a shared map.
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    entries: Arc<RwLock<BTreeMap<String, Entry>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every entry, for inspection.
    pub fn snapshot(&self) -> BTreeMap<String, Entry> {
        match self.entries.read() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Registry for MemoryCatalog {
    fn get(&self, name: &str) -> Option<Entry> {
        let entries = self.entries.read().ok()?;
        entries.get(name).cloned()
    }

    fn insert_all(&self, batch: Vec<(String, Entry)>) -> Result<(), RegistryError> {
        if let Some((name, _)) = batch.iter().find(|(name, _)| name.is_empty()) {
            return Err(RegistryError::InvalidName(name.clone()));
        }

        let mut entries = self.entries.write().map_err(|_| RegistryError::Poisoned)?;
        let count = batch.len();
        for (name, value) in batch {
            entries.insert(name, value);
        }
        tracing::trace!(count, total = entries.len(), "registry batch applied");
        Ok(())
    }

    fn names(&self) -> Vec<String> {
        match self.entries.read() {
            Ok(entries) => entries.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }
}
