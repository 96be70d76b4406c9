//! Process-wide default fragment store.
//!
//! Renders that are not handed a store explicitly use this one. It starts out
//! as a bounded [`MemoryStore`] and can be replaced once, at startup, before
//! anything has read it.
//!
//! ```rust,ignore
//! // In main(), before the first render:
//! rendercache::set_collection_cache(Arc::new(MemoryStore::new(10_000)));
//!
//! let cache = rendercache::global_render_cache(FragmentKey::new("posts/_post"));
//! ```

use std::sync::{Arc, OnceLock};

use rendercache_collection::{CacheStore, DEFAULT_MAX_ENTRIES, MemoryStore};

/// A fragment store shareable across threads.
pub type SharedStore = Arc<dyn CacheStore<String> + Send + Sync>;

static COLLECTION_CACHE: OnceLock<SharedStore> = OnceLock::new();

/// Install the process-wide store. Only the first call (before any read) takes effect.
///
/// Returns whether `store` was installed.
pub fn set_collection_cache(store: SharedStore) -> bool {
    let installed = COLLECTION_CACHE.set(store).is_ok();
    if !installed {
        tracing::warn!(
            target: "rendercache::collection",
            "Collection cache already initialized, ignoring replacement store"
        );
    }
    installed
}

/// The process-wide store, initialising it to a [`MemoryStore`] on first use.
#[must_use]
pub fn collection_cache() -> SharedStore {
    COLLECTION_CACHE
        .get_or_init(|| {
            tracing::debug!(
                target: "rendercache::collection",
                max_entries = DEFAULT_MAX_ENTRIES,
                "Initializing default in-memory collection cache"
            );
            Arc::new(MemoryStore::<String>::new(DEFAULT_MAX_ENTRIES))
        })
        .clone()
}

/// Has the process-wide store been initialised (explicitly or by first use)?
#[must_use]
pub fn has_collection_cache() -> bool {
    COLLECTION_CACHE.get().is_some()
}
