use super::host::ClassLoaderHandle;
use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Key that refers to a loader without keeping it alive
///
/// Hashing uses the allocation address captured at construction. Equality requires both
/// sides to still be alive and to be the same allocation, so a dead key matches nothing
/// and simply waits to be evicted. An allocation reused at the same address hashes into
/// the same bucket but never compares equal to the dead key it displaced.
pub struct LoaderKey {
    weak: Weak<ClassLoaderHandle>,
    addr: usize,
}

impl LoaderKey {
    pub fn of(loader: &Arc<ClassLoaderHandle>) -> LoaderKey {
        LoaderKey {
            weak: Arc::downgrade(loader),
            addr: Arc::as_ptr(loader) as usize,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.weak.strong_count() == 0
    }
}

impl PartialEq for LoaderKey {
    fn eq(&self, other: &LoaderKey) -> bool {
        match (self.weak.upgrade(), other.weak.upgrade()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            _ => false,
        }
    }
}

impl Eq for LoaderKey {}

impl Hash for LoaderKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

/// Map of per-loader state that never pins a loader
///
/// Stale entries are swept on every write, so the cache shrinks as loaders go away even
/// when nobody calls [`LoaderScopedCache::evict_stale`] explicitly.
pub struct LoaderScopedCache<V> {
    entries: DashMap<LoaderKey, V>,
}

impl<V: Default> LoaderScopedCache<V> {
    pub fn new() -> LoaderScopedCache<V> {
        LoaderScopedCache {
            entries: DashMap::new(),
        }
    }

    /// Mutate the state scoped to one loader, creating it on first touch
    pub fn update<R>(
        &self,
        loader: &Arc<ClassLoaderHandle>,
        update: impl FnOnce(&mut V) -> R,
    ) -> R {
        self.evict_stale();
        let mut entry = self.entries.entry(LoaderKey::of(loader)).or_default();
        update(entry.value_mut())
    }

    /// Read the state scoped to one loader
    pub fn read<R>(
        &self,
        loader: &Arc<ClassLoaderHandle>,
        read: impl FnOnce(&V) -> R,
    ) -> Option<R> {
        let key = LoaderKey::of(loader);
        self.entries.get(&key).map(|entry| read(entry.value()))
    }

    /// Drop state for loaders that no longer exist
    pub fn evict_stale(&self) {
        self.entries.retain(|key, _| !key.is_stale());
    }

    /// Number of loaders currently tracked
    pub fn loaders(&self) -> usize {
        self.entries.len()
    }
}

impl<V: Default> Default for LoaderScopedCache<V> {
    fn default() -> LoaderScopedCache<V> {
        LoaderScopedCache::new()
    }
}
