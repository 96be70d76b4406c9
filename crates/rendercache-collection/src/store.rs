//! Cache stores for rendered fragments.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard};

use rendercache_core::{CacheKey, Error, Result, StoreError, StoreErrorKind};

use crate::config::DEFAULT_MAX_ENTRIES;

/// A store of rendered outputs keyed by [`CacheKey`].
///
/// Stores are shared, so both operations take `&self`; implementations
/// synchronise internally.
pub trait CacheStore<O> {
    /// Read every key present in the store. Missing keys are simply absent
    /// from the returned map.
    fn read_multi(&self, keys: &[CacheKey]) -> Result<HashMap<CacheKey, O>>;

    /// Store `value` under `key`, replacing any previous value.
    fn write(&self, key: &CacheKey, value: &O) -> Result<()>;
}

impl<O, S: CacheStore<O> + ?Sized> CacheStore<O> for &S {
    fn read_multi(&self, keys: &[CacheKey]) -> Result<HashMap<CacheKey, O>> {
        (**self).read_multi(keys)
    }

    fn write(&self, key: &CacheKey, value: &O) -> Result<()> {
        (**self).write(key, value)
    }
}

impl<O, S: CacheStore<O> + ?Sized> CacheStore<O> for Rc<S> {
    fn read_multi(&self, keys: &[CacheKey]) -> Result<HashMap<CacheKey, O>> {
        (**self).read_multi(keys)
    }

    fn write(&self, key: &CacheKey, value: &O) -> Result<()> {
        (**self).write(key, value)
    }
}

impl<O, S: CacheStore<O> + ?Sized> CacheStore<O> for Arc<S> {
    fn read_multi(&self, keys: &[CacheKey]) -> Result<HashMap<CacheKey, O>> {
        (**self).read_multi(keys)
    }

    fn write(&self, key: &CacheKey, value: &O) -> Result<()> {
        (**self).write(key, value)
    }
}

#[derive(Debug, Clone)]
struct Entry<O> {
    value: O,
    /// Access tick of the last read or write.
    last_used: u64,
    hit_count: u64,
}

/// Counters kept by [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// `read_multi` calls
    pub reads: u64,
    /// Keys found across all reads
    pub hits: u64,
    /// Keys requested but not found
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
}

#[derive(Debug)]
struct Inner<O> {
    entries: HashMap<CacheKey, Entry<O>>,
    tick: u64,
    stats: StoreStats,
}

impl<O> Inner<O> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_lru(&mut self) {
        let lru = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = lru {
            tracing::trace!(target: "rendercache::collection", key = %key, "Evicting cached fragment");
            self.entries.remove(&key);
            self.stats.evictions += 1;
        }
    }
}

/// Bounded in-memory store with least-recently-used eviction.
///
/// # Example
///
/// ```
/// use rendercache_collection::{CacheStore, MemoryStore};
/// use rendercache_core::CacheKey;
///
/// let store = MemoryStore::new(2);
/// store.write(&CacheKey::new("a"), &"A".to_string()).unwrap();
/// store.write(&CacheKey::new("b"), &"B".to_string()).unwrap();
///
/// let hits = store.read_multi(&[CacheKey::new("a"), CacheKey::new("z")]).unwrap();
/// assert_eq!(hits.len(), 1);
///
/// // "b" is now the least recently used entry and makes room for "c".
/// store.write(&CacheKey::new("c"), &"C".to_string()).unwrap();
/// assert!(store.contains("a"));
/// assert!(!store.contains("b"));
/// ```
#[derive(Debug)]
pub struct MemoryStore<O> {
    inner: Mutex<Inner<O>>,
    max_entries: usize,
}

impl<O> MemoryStore<O> {
    /// Create a store holding at most `max_entries` fragments.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(max_entries.min(256)),
                tick: 0,
                stats: StoreStats::default(),
            }),
            max_entries,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn lock(&self, kind: StoreErrorKind, key_count: usize) -> Result<MutexGuard<'_, Inner<O>>> {
        self.inner.lock().map_err(|_| {
            Error::Store(StoreError {
                kind,
                message: "memory store lock poisoned".to_string(),
                key_count,
                source: None,
            })
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .lock()
            .is_ok_and(|inner| inner.entries.contains_key(key))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map_or(0, |inner| inner.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many reads have returned `key`.
    pub fn hit_count(&self, key: &str) -> u64 {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.entries.get(key).map(|e| e.hit_count))
            .unwrap_or(0)
    }

    pub fn stats(&self) -> StoreStats {
        self.inner
            .lock()
            .map(|inner| inner.stats)
            .unwrap_or_default()
    }

    /// Remove one entry. Returns whether it was present.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.lock(StoreErrorKind::Write, 1)?;
        Ok(inner.entries.remove(key).is_some())
    }

    /// Remove every entry and reset the counters.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.lock(StoreErrorKind::Write, 0)?;
        inner.entries.clear();
        inner.stats = StoreStats::default();
        Ok(())
    }
}

impl<O> Default for MemoryStore<O> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl<O: Clone> CacheStore<O> for MemoryStore<O> {
    fn read_multi(&self, keys: &[CacheKey]) -> Result<HashMap<CacheKey, O>> {
        let mut inner = self.lock(StoreErrorKind::Read, keys.len())?;
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            let tick = inner.next_tick();
            if let Some(entry) = inner.entries.get_mut(key) {
                entry.last_used = tick;
                entry.hit_count += 1;
                found.insert(key.clone(), entry.value.clone());
            }
        }
        inner.stats.reads += 1;
        inner.stats.hits += found.len() as u64;
        inner.stats.misses += (keys.len() - found.len()) as u64;
        Ok(found)
    }

    fn write(&self, key: &CacheKey, value: &O) -> Result<()> {
        if self.max_entries == 0 {
            return Ok(());
        }
        let mut inner = self.lock(StoreErrorKind::Write, 1)?;
        if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_entries {
            inner.evict_lru();
        }
        let tick = inner.next_tick();
        let hit_count = inner.entries.get(key).map_or(0, |e| e.hit_count);
        inner.entries.insert(
            key.clone(),
            Entry {
                value: value.clone(),
                last_used: tick,
                hit_count,
            },
        );
        inner.stats.writes += 1;
        Ok(())
    }
}
