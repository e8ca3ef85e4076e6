use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::debug;

use crate::models::Preview;
use crate::preview::service::Waiter;

struct CachedPreview {
    preview: Arc<Preview>,
    inserted: Instant,
}

struct CacheInner {
    /// Unbounded on its own; `insert` enforces the capacity in batches.
    /// Lookups use `peek`, so only insertion moves an entry to the newest end.
    entries: LruCache<PathBuf, CachedPreview>,
    in_flight: HashMap<PathBuf, Vec<Waiter>>,
}

impl Default for CacheInner {
    fn default() -> Self {
        Self {
            entries: LruCache::unbounded(),
            in_flight: HashMap::new(),
        }
    }
}

impl CacheInner {
    fn remove(&mut self, path: &Path) -> bool {
        self.entries.pop(path).is_some()
    }

    fn fresh(&mut self, path: &Path, max_age: Duration) -> Option<Arc<Preview>> {
        let cached = self.entries.peek(path)?;
        if cached.inserted.elapsed() < max_age {
            return Some(cached.preview.clone());
        }
        debug!(path = %path.display(), "preview expired");
        self.entries.pop(path);
        None
    }

    fn evict_oldest(&mut self, count: usize) -> Vec<PathBuf> {
        let mut evicted = Vec::with_capacity(count.min(self.entries.len()));
        while evicted.len() < count {
            let Some((path, _)) = self.entries.pop_lru() else {
                break;
            };
            evicted.push(path);
        }
        evicted
    }

    /// Inserts, evicting a batch first when the cache is full, so the size
    /// never exceeds `capacity`. Replacing an existing key never evicts.
    fn insert(&mut self, preview: Arc<Preview>, capacity: usize, batch: usize) -> Vec<PathBuf> {
        let path = preview.path.clone();
        let evicted = if !self.entries.contains(&path) && self.entries.len() >= capacity {
            self.evict_oldest(batch)
        } else {
            Vec::new()
        };

        self.entries.push(
            path,
            CachedPreview {
                preview,
                inserted: Instant::now(),
            },
        );
        evicted
    }
}

pub(crate) enum Claim {
    Hit(Arc<Preview>),
    /// Another worker is generating this key; the waiter was queued on it.
    Joined,
    /// The caller owns generation for this key and must call `complete`.
    Generate,
}

/// Bounded preview store. Every public operation takes the single lock once,
/// so lookups, inserts and evictions are never observed half-done.
pub struct PreviewCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    eviction_count: usize,
    max_age: Duration,
}

impl PreviewCache {
    pub fn new(capacity: usize, eviction_count: usize, max_age: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity,
            eviction_count: eviction_count.clamp(1, capacity),
            max_age,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn eviction_count(&self) -> usize {
        self.eviction_count
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().entries.contains(path)
    }

    /// Returns a fresh entry; expired entries are dropped on the way.
    pub fn get(&self, path: &Path) -> Option<Arc<Preview>> {
        self.lock().fresh(path, self.max_age)
    }

    /// Inserts (or replaces) an entry and returns the keys evicted to make
    /// room.
    pub fn insert(&self, preview: Arc<Preview>) -> Vec<PathBuf> {
        self.lock()
            .insert(preview, self.capacity, self.eviction_count)
    }

    pub fn remove(&self, path: &Path) -> bool {
        self.lock().remove(path)
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn is_generating(&self, path: &Path) -> bool {
        self.lock().in_flight.contains_key(path)
    }

    /// Lookup and claim in one critical section: at most one generation per
    /// key is ever outstanding.
    pub(crate) fn lookup_or_claim(&self, path: &Path, waiter: Waiter) -> Claim {
        let mut inner = self.lock();
        if let Some(preview) = inner.fresh(path, self.max_age) {
            return Claim::Hit(preview);
        }
        match inner.in_flight.get_mut(path) {
            Some(waiters) => {
                waiters.push(waiter);
                Claim::Joined
            }
            None => {
                inner.in_flight.insert(path.to_path_buf(), vec![waiter]);
                Claim::Generate
            }
        }
    }

    /// Stores a finished preview and hands back everyone waiting on it.
    pub(crate) fn complete(&self, preview: Arc<Preview>) -> (Vec<Waiter>, Vec<PathBuf>) {
        let mut inner = self.lock();
        let waiters = inner.in_flight.remove(&preview.path).unwrap_or_default();
        let evicted = inner.insert(preview, self.capacity, self.eviction_count);
        (waiters, evicted)
    }

    /// Releases a claim without caching anything.
    pub(crate) fn abandon(&self, path: &Path) -> Vec<Waiter> {
        self.lock().in_flight.remove(path).unwrap_or_default()
    }
}
