//! Record stream backends and their lookup by storage id.

mod jsonl;
mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use bag_api::storage::{RecordStream, StorageOptions, StreamFactory};

use crate::config::DEFAULT_STORAGE_ID;
use crate::error::ReaderError;

pub use jsonl::{
    BAG_VERSION, BagMetadata, DiskRecord, JsonlStream, JsonlStreamFactory, MESSAGES_FILE,
    METADATA_FILE,
};
pub use memory::{MemoryBag, MemoryStream};

pub const STORAGE_JSONL: &str = "jsonl";
pub const STORAGE_MEMORY: &str = "memory";

/// Storage id → stream factory.
pub struct StorageRegistry {
    factories: HashMap<String, Arc<dyn StreamFactory>>,
}

impl StorageRegistry {
    /// No backends at all.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// `jsonl` only. `memory` needs records, see [`StorageRegistry::with_memory`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(STORAGE_JSONL, Arc::new(JsonlStreamFactory));
        registry
    }

    /// Builtins plus `memory` serving `bag`.
    pub fn with_memory(bag: MemoryBag) -> Self {
        let mut registry = Self::with_builtins();
        registry.register(STORAGE_MEMORY, Arc::new(bag));
        registry
    }

    pub fn register(&mut self, storage_id: impl Into<String>, factory: Arc<dyn StreamFactory>) {
        let storage_id = storage_id.into();
        if self.factories.insert(storage_id.clone(), factory).is_some() {
            tracing::warn!(storage_id = %storage_id, "storage backend replaced");
        }
    }

    pub fn contains(&self, storage_id: &str) -> bool {
        self.factories.contains_key(storage_id)
    }

    /// Sorted storage ids.
    pub fn storage_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Open a stream for `options`. An empty storage id selects `jsonl`.
    pub fn open(&self, options: &StorageOptions) -> Result<Box<dyn RecordStream>, ReaderError> {
        let storage_id = match options.storage_id.as_str() {
            "" => DEFAULT_STORAGE_ID,
            id => id,
        };
        let factory = self.factories.get(storage_id).ok_or_else(|| {
            ReaderError::Config(format!(
                "unknown storage id '{storage_id}' (available: {})",
                self.storage_ids().join(", ")
            ))
        })?;
        factory
            .open(options)
            .map_err(|e| ReaderError::from(e).with_context(format!("bag '{}'", options.uri)))
    }
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("storage_ids", &self.storage_ids())
            .finish()
    }
}
