//! Per-worker module cache.

use std::collections::HashMap;

use crate::engine::{ImportResolver, ModuleRef};

/// Mapping between resolved module identifiers and compiled module handles,
/// plus the inverse mapping from handle identity back to identifier.
///
/// One cache exists per worker context. An identifier maps to at most one
/// handle for the lifetime of the context: re-requesting a cached
/// identifier never recompiles or refetches. The cache grows incrementally
/// during loads and shrinks only on context teardown.
#[derive(Debug, Clone, Default)]
pub struct ModuleCache {
    by_identifier: HashMap<String, ModuleRef>,
    by_handle: HashMap<ModuleRef, String>,
}

impl ModuleCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The compiled handle for `identifier`, if one was cached.
    pub fn lookup(&self, identifier: &str) -> Option<ModuleRef> {
        self.by_identifier.get(identifier).copied()
    }

    /// The identifier a handle was cached under, if any.
    pub fn identifier_of(&self, handle: ModuleRef) -> Option<&str> {
        self.by_handle.get(&handle).map(String::as_str)
    }

    /// Record `identifier` → `handle`.
    ///
    /// The first insertion for an identifier wins; returns `false` without
    /// touching the cache when the identifier is already present.
    pub fn insert(&mut self, identifier: impl Into<String>, handle: ModuleRef) -> bool {
        let identifier = identifier.into();
        if self.by_identifier.contains_key(&identifier) {
            return false;
        }
        self.by_handle.insert(handle, identifier.clone());
        self.by_identifier.insert(identifier, handle);
        true
    }

    /// Number of cached modules.
    pub fn len(&self) -> usize {
        self.by_identifier.len()
    }

    /// Returns `true` if nothing has been cached.
    pub fn is_empty(&self) -> bool {
        self.by_identifier.is_empty()
    }

    /// Drop every cached entry. Context teardown only.
    pub fn clear(&mut self) {
        self.by_identifier.clear();
        self.by_handle.clear();
    }
}

impl ImportResolver for ModuleCache {
    fn resolve(&self, specifier: &str) -> Option<ModuleRef> {
        self.lookup(specifier)
    }
}
