//! Rendering relations through the collection cache.
//!
//! [`render_relation`] wires the two halves together. When the call is cached
//! and the relation has not been loaded yet, its preloading is deferred, so
//! loading only attaches bulk loaders. The render cache then marks every hit
//! record and every record dropped for sharing its key with a later one,
//! which takes it out of its loader's batch, and right before the misses are
//! rendered the deferred loads fire for whatever is left. A render
//! where every record hits issues no association loads at all.

use std::rc::Rc;

use rendercache_collection::{Cached, CacheStore, CollectionRenderCache, RenderPayload};
use rendercache_core::{CacheKeySeed, FragmentKey, Result};
use rendercache_preload::{Deferrable, Relation};

use crate::global_store::{SharedStore, collection_cache};

/// Render the records of `relation` through `cache`.
///
/// The callback receives the records that missed the cache, with the
/// relation's associations already batch-loaded for exactly those records.
///
/// # Errors
///
/// Load, store and callback errors propagate.
#[tracing::instrument(level = "debug", skip_all, fields(template = %cache.fragment().virtual_path(), records = relation.len()))]
pub fn render_relation<R, O, S, F>(
    cache: &CollectionRenderCache<S>,
    relation: &mut Relation<R>,
    cached: &Cached<Rc<R>>,
    payload: &mut RenderPayload,
    render_fn: F,
) -> Result<Vec<O>>
where
    R: Deferrable + CacheKeySeed + 'static,
    S: CacheStore<O>,
    F: FnOnce(&[Rc<R>]) -> Result<Vec<O>>,
{
    if cache.is_enabled() && cached.is_enabled() && !relation.is_loaded() {
        relation.defer_preloading();
    }
    relation.load()?;

    let relation = &*relation;
    let items = relation.records().to_vec();
    cache.render(items, cached, payload, |misses| {
        let loads = relation.preload_deferred()?;
        tracing::debug!(
            target: "rendercache::preload",
            misses = misses.len(),
            loads,
            "Preloaded associations for cache misses"
        );
        render_fn(misses)
    })
}

/// A render cache for `fragment` backed by the process-wide store.
pub fn global_render_cache(fragment: FragmentKey) -> CollectionRenderCache<SharedStore> {
    CollectionRenderCache::new(collection_cache(), fragment)
}
