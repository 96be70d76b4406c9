//! Items that can be rendered through the collection cache.

use std::rc::Rc;

use rendercache_core::CacheKeySeed;
use rendercache_preload::Deferrable;

/// An element of a cached collection.
///
/// Items seed their own cache key. Items backed by deferrable records cancel
/// their pending association loads when their output comes from the cache.
pub trait CollectionItem: CacheKeySeed {
    /// Called once for every item whose output was found in the cache, before
    /// the misses are rendered.
    fn on_cache_hit(&self) {}

    /// Called for an item replaced by a later item with the same key. It is
    /// never rendered, so nothing should be loaded for it.
    fn on_superseded(&self) {}

    /// Whether `other` is this very item, as opposed to an equal-keyed one.
    fn is_same_item(&self, _other: &Self) -> bool {
        false
    }
}

impl<R: Deferrable + CacheKeySeed> CollectionItem for Rc<R> {
    fn on_cache_hit(&self) {
        self.mark_as_cache_hit();
    }

    fn on_superseded(&self) {
        self.exclude_from_preloading();
    }

    fn is_same_item(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

macro_rules! impl_plain_item {
    ($($ty:ty),* $(,)?) => {
        $(impl CollectionItem for $ty {})*
    };
}

impl_plain_item!(String, &str, i32, i64, u32, u64, usize, serde_json::Value);
