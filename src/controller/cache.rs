//! Memoized middleware chains keyed by route path and scope.
//!
//! An entry stays valid until middleware is registered (or removed) under a
//! group its scope contains; such changes purge every intersecting entry.

use super::{middleware::Chain, scope::Scope};
use dashmap::DashMap;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Cache key: the route path and the full ordered scope, compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ChainKey {
    path: String,
    scope: Scope,
}

impl ChainKey {
    pub fn new(path: impl Into<String>, scope: Scope) -> Self {
        Self {
            path: path.into(),
            scope,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

/// Counters describing cache effectiveness.
///
/// `misses` counts how many times a chain had to be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug)]
pub(crate) struct ChainCache {
    enabled: bool,
    entries: DashMap<ChainKey, Arc<Chain>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ChainCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached chain for `key`, resolving and storing it on a miss.
    /// The flag is true on a hit.
    pub fn get_or_resolve<F>(&self, key: ChainKey, resolve: F) -> (Arc<Chain>, bool)
    where
        F: FnOnce(&Scope) -> Chain,
    {
        if self.enabled
            && let Some(chain) = self.entries.get(&key).map(|entry| entry.value().clone())
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return (chain, true);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let chain = Arc::new(resolve(key.scope()));
        if self.enabled {
            self.entries.insert(key, chain.clone());
        }
        (chain, false)
    }

    /// Drops every entry whose scope contains one of `groups`.
    /// Returns the number of entries dropped.
    pub fn invalidate<S: AsRef<str>>(&self, groups: &[S]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.scope.intersects(groups));
        before.saturating_sub(self.entries.len())
    }

    /// Drops the entries resolved for exactly `scope`, on any path.
    pub fn remove_scope(&self, scope: &Scope) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| &key.scope != scope);
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}
