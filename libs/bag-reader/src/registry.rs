use std::collections::BTreeMap;

use bag_api::message::BagMessage;
use bag_api::schema::{Schema, SchemaResolver};

/// Message layouts known to one reader, keyed by wire type name.
///
/// Two sources feed it: Rust types registered by the caller (they win on
/// conflict) and definitions recorded in the bag (only fill gaps).
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    schemas: BTreeMap<String, Schema>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` and every message type nested in it.
    pub fn register<T: BagMessage>(&mut self) {
        let mut collected = BTreeMap::new();
        T::collect_schemas(&mut collected);
        for (name, schema) in collected {
            let replaced = self
                .schemas
                .get(&name)
                .is_some_and(|previous| previous != &schema);
            if replaced {
                tracing::warn!(type_name = %name, "registered type replaces a different layout");
            }
            self.schemas.insert(name, schema);
        }
    }

    /// Add a recorded definition unless the type is already known.
    /// Returns whether the definition was added.
    pub fn insert_if_absent(&mut self, type_name: impl Into<String>, schema: Schema) -> bool {
        use std::collections::btree_map::Entry;
        match self.schemas.entry(type_name.into()) {
            Entry::Vacant(slot) => {
                slot.insert(schema);
                true
            }
            Entry::Occupied(existing) => {
                if existing.get() != &schema {
                    tracing::warn!(
                        type_name = %existing.key(),
                        "recorded definition differs from registered type, keeping registered one"
                    );
                }
                false
            }
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.schemas.contains_key(type_name)
    }

    pub fn get(&self, type_name: &str) -> Option<&Schema> {
        self.schemas.get(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Nested types reachable from `type_name` that have no layout, sorted.
    pub fn missing_dependencies(&self, type_name: &str) -> Vec<String> {
        let mut missing = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        let mut stack = vec![type_name.to_string()];
        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            match self.schemas.get(&name) {
                Some(schema) => stack.extend(schema.dependencies().map(str::to_string)),
                None => missing.push(name),
            }
        }
        missing.sort();
        missing
    }
}

impl SchemaResolver for TypeRegistry {
    fn resolve(&self, type_name: &str) -> Option<&Schema> {
        self.schemas.get(type_name)
    }
}
