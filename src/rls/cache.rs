//! Compiled-policy cache, keyed by `(table, policy_name)`. Invalidated
//! wholesale on `UpsertPolicy` — the registry is small and writes are rare,
//! so a single generation counter is simpler than per-key invalidation.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::RlsPolicy;

#[derive(Default)]
struct Inner {
    generation: u64,
    policies: HashMap<String, (u64, Vec<RlsPolicy>)>,
}

#[derive(Clone, Default)]
pub struct PolicyCache {
    inner: Arc<RwLock<Inner>>,
}

impl PolicyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &str) -> Option<Vec<RlsPolicy>> {
        let inner = self.inner.read();
        inner
            .policies
            .get(table)
            .filter(|(gen, _)| *gen == inner.generation)
            .map(|(_, policies)| policies.clone())
    }

    pub fn put(&self, table: &str, policies: Vec<RlsPolicy>) {
        let mut inner = self.inner.write();
        let generation = inner.generation;
        inner.policies.insert(table.to_string(), (generation, policies));
    }

    /// Bumps the generation counter, lazily invalidating every cached entry
    /// on next lookup without walking the map.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.write();
        inner.generation += 1;
    }
}
