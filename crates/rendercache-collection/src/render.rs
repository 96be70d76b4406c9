//! Cached collection rendering.

use std::collections::HashMap;

use rendercache_core::{CacheKey, Error, FragmentKey, RenderError, RenderErrorKind, Result};
use serde::Serialize;

use crate::config::CollectionCacheConfig;
use crate::item::CollectionItem;
use crate::keyed::KeyedCollection;
use crate::options::Cached;
use crate::store::CacheStore;

/// What one render call did, for instrumentation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderPayload {
    /// Keys found in the store
    pub cache_hits: usize,
    /// Keys that had to be rendered
    pub cache_misses: usize,
    /// Items passed to the render callback
    pub rendered: usize,
    /// Fragments written back to the store
    pub written: usize,
    /// Whether the call went through the store at all
    pub cached: bool,
}

/// Renders collections through a fragment cache.
///
/// Each call expands the items into keys, reads them all with one
/// `read_multi`, tells hit items they are hits and dropped duplicates they
/// were superseded (which cancels their deferred association loads), renders
/// only the misses with a single callback
/// invocation, then assembles the output in key order and writes the newly
/// rendered fragments back.
#[derive(Debug, Clone)]
pub struct CollectionRenderCache<S> {
    store: S,
    fragment: FragmentKey,
    enabled: bool,
}

impl<S> CollectionRenderCache<S> {
    pub fn new(store: S, fragment: FragmentKey) -> Self {
        Self {
            store,
            fragment,
            enabled: true,
        }
    }

    /// Build from configuration for the template at `virtual_path`.
    pub fn from_config(
        store: S,
        config: &CollectionCacheConfig,
        virtual_path: &str,
        template_source: &str,
    ) -> Self {
        Self {
            store,
            fragment: config.fragment_key(virtual_path, template_source),
            enabled: config.enabled,
        }
    }

    /// Turn caching off for every call, whatever its options say.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn fragment(&self) -> &FragmentKey {
        &self.fragment
    }

    /// Expand `items` into their fragment keys.
    pub fn expand<I: CollectionItem>(
        &self,
        items: Vec<I>,
        cached: &Cached<I>,
    ) -> KeyedCollection<I> {
        KeyedCollection::expand(items, |item| match cached {
            Cached::Seed(seed) => self.fragment.expand(&seed(item)),
            Cached::Default | Cached::Disabled => self.fragment.expand_seed(item),
        })
    }

    /// Render `items`, reusing cached fragments.
    ///
    /// Returns one output per expanded key, in key order. With caching
    /// disabled the callback's output for all items is returned unchanged.
    ///
    /// # Errors
    ///
    /// Store and callback errors propagate. A callback that returns a
    /// different number of outputs than it was given items fails with
    /// [`RenderErrorKind::Misaligned`]; nothing is written in that case.
    #[tracing::instrument(level = "debug", skip_all, fields(template = %self.fragment.virtual_path(), items = items.len()))]
    pub fn render<I, O, F>(
        &self,
        items: Vec<I>,
        cached: &Cached<I>,
        payload: &mut RenderPayload,
        render_fn: F,
    ) -> Result<Vec<O>>
    where
        I: CollectionItem,
        S: CacheStore<O>,
        F: FnOnce(&[I]) -> Result<Vec<O>>,
    {
        if !self.enabled || !cached.is_enabled() {
            payload.cached = false;
            payload.rendered = items.len();
            tracing::debug!(target: "rendercache::collection", "Caching disabled, rendering all items");
            return render_fn(&items);
        }
        payload.cached = true;

        let keyed = self.expand(items, cached);
        let keys = keyed.expanded_keys();

        let mut hits: HashMap<CacheKey, O> = self.store.read_multi(&keys)?;
        // Stores may answer with keys that were not asked for.
        hits.retain(|key, _| keyed.get(key.as_str()).is_some());
        payload.cache_hits = hits.len();
        payload.cache_misses = keys.len() - hits.len();
        tracing::info!(
            target: "rendercache::collection",
            keys = keys.len(),
            hits = payload.cache_hits,
            misses = payload.cache_misses,
            collapsed = keyed.collapsed(),
            "Collection cache lookup"
        );

        for item in keyed.hit_items(&hits) {
            item.on_cache_hit();
        }
        // A dropped duplicate is rendered only if it is the surviving item itself.
        for (key, item) in keyed.superseded() {
            if !keyed.get(key.as_str()).is_some_and(|kept| item.is_same_item(kept)) {
                item.on_superseded();
            }
        }

        let misses = keyed.into_missed(&hits);
        let rendered = if misses.is_empty() {
            Vec::new()
        } else {
            payload.rendered = misses.len();
            let rendered = render_fn(&misses)?;
            if rendered.len() != misses.len() {
                return Err(Error::Render(RenderError {
                    kind: RenderErrorKind::Misaligned {
                        expected: misses.len(),
                        actual: rendered.len(),
                    },
                    message: "render callback output is not aligned with its input".to_string(),
                    source: None,
                }));
            }
            rendered
        };

        let mut rendered = rendered.into_iter();
        let mut output = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(hit) = hits.remove(key) {
                output.push(hit);
                continue;
            }
            // The length check above guarantees one rendered output per miss.
            let Some(fresh) = rendered.next() else {
                break;
            };
            self.store.write(key, &fresh)?;
            payload.written += 1;
            output.push(fresh);
        }

        tracing::debug!(
            target: "rendercache::collection",
            outputs = output.len(),
            written = payload.written,
            "Collection render complete"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::cell::RefCell;

    /// Item whose key seed is chosen by the test.
    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: &'static str,
        seed: &'static str,
    }

    impl rendercache_core::CacheKeySeed for Item {
        fn cache_key_seed(&self) -> String {
            self.seed.to_string()
        }
    }

    impl CollectionItem for Item {}

    fn items(specs: &[(&'static str, &'static str)]) -> Vec<Item> {
        specs
            .iter()
            .map(|&(name, seed)| Item { name, seed })
            .collect()
    }

    fn cache() -> CollectionRenderCache<MemoryStore<String>> {
        CollectionRenderCache::new(MemoryStore::new(64), FragmentKey::new("items/_item"))
    }

    fn render_names(items: &[Item]) -> Result<Vec<String>> {
        Ok(items.iter().map(|i| format!("rendered{}", i.name)).collect())
    }

    #[test]
    fn mixed_hits_and_duplicate_keys() {
        let cache = cache();
        let k1 = cache.fragment().expand("k1");
        let k2 = cache.fragment().expand("k2");
        cache.store().write(&k2, &"cachedB".to_string()).unwrap();

        let seen = RefCell::new(Vec::new());
        let mut payload = RenderPayload::default();
        let out = cache
            .render(
                items(&[("A", "k1"), ("B", "k2"), ("C", "k1")]),
                &Cached::Default,
                &mut payload,
                |misses| {
                    seen.borrow_mut().extend(misses.iter().map(|i| i.name));
                    render_names(misses)
                },
            )
            .unwrap();

        assert_eq!(out, vec!["renderedC".to_string(), "cachedB".to_string()]);
        assert_eq!(*seen.borrow(), vec!["C"]);
        assert_eq!(
            cache.store().read_multi(&[k1]).unwrap().into_values().collect::<Vec<_>>(),
            vec!["renderedC".to_string()]
        );
        assert_eq!(
            payload,
            RenderPayload {
                cache_hits: 1,
                cache_misses: 1,
                rendered: 1,
                written: 1,
                cached: true,
            }
        );
    }

    #[test]
    fn zero_hits_renders_everything_and_writes_back() {
        let cache = cache();
        let input = items(&[("A", "a"), ("B", "b"), ("C", "c")]);
        let mut payload = RenderPayload::default();
        let out = cache
            .render(input.clone(), &Cached::Default, &mut payload, render_names)
            .unwrap();

        assert_eq!(out, render_names(&input).unwrap());
        assert_eq!(payload.written, 3);
        assert_eq!(cache.store().len(), 3);
    }

    #[test]
    fn all_hits_never_render_or_write() {
        let cache = cache();
        let input = items(&[("A", "a"), ("B", "b")]);
        let mut payload = RenderPayload::default();
        cache
            .render(input.clone(), &Cached::Default, &mut payload, render_names)
            .unwrap();
        let writes_before = cache.store().stats().writes;

        let mut payload = RenderPayload::default();
        let out = cache
            .render(input, &Cached::Default, &mut payload, |_| -> Result<Vec<String>> {
                panic!("render must not be called when every item is cached")
            })
            .unwrap();
        assert_eq!(out, vec!["renderedA".to_string(), "renderedB".to_string()]);
        assert_eq!(payload.cache_hits, 2);
        assert_eq!(payload.rendered, 0);
        assert_eq!(cache.store().stats().writes, writes_before);
    }

    #[test]
    fn disabled_bypasses_the_store() {
        let cache = cache();
        let input = items(&[("A", "k"), ("B", "k")]);
        let mut payload = RenderPayload::default();
        let out = cache
            .render(input, &Cached::Disabled, &mut payload, render_names)
            .unwrap();
        assert_eq!(out, vec!["renderedA".to_string(), "renderedB".to_string()]);
        assert!(!payload.cached);
        assert_eq!(cache.store().stats().reads, 0);

        let off = CollectionRenderCache::new(MemoryStore::<String>::new(4), FragmentKey::new("x"))
            .enabled(false);
        let mut payload = RenderPayload::default();
        off.render(items(&[("A", "k")]), &Cached::Default, &mut payload, render_names)
            .unwrap();
        assert!(!payload.cached);
        assert_eq!(off.store().stats().reads, 0);
    }

    #[test]
    fn custom_seed_function() {
        let cache = cache();
        let seed = Cached::seed(|item: &Item| format!("custom/{}", item.name));
        let mut payload = RenderPayload::default();
        cache
            .render(items(&[("A", "ignored")]), &seed, &mut payload, render_names)
            .unwrap();
        assert!(cache.store().contains("views/items/_item/custom/A"));
    }

    #[test]
    fn misaligned_output_is_an_error() {
        let cache = cache();
        let mut payload = RenderPayload::default();
        let err = cache
            .render(
                items(&[("A", "a"), ("B", "b")]),
                &Cached::Default,
                &mut payload,
                |_| Ok(vec!["only one".to_string()]),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Render(RenderError {
                kind: RenderErrorKind::Misaligned {
                    expected: 2,
                    actual: 1
                },
                ..
            })
        ));
        assert!(cache.store().is_empty());
    }

    #[test]
    fn callback_errors_propagate() {
        let cache = cache();
        let mut payload = RenderPayload::default();
        let err = cache
            .render(
                items(&[("A", "a")]),
                &Cached::Default,
                &mut payload,
                |_| -> Result<Vec<String>> { Err(Error::Custom("template blew up".to_string())) },
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "template blew up");
    }

    /// Item that logs which hooks the cache called on it.
    struct Logged<'a> {
        name: &'static str,
        seed: &'static str,
        log: &'a RefCell<Vec<String>>,
    }

    impl rendercache_core::CacheKeySeed for Logged<'_> {
        fn cache_key_seed(&self) -> String {
            self.seed.to_string()
        }
    }

    impl CollectionItem for Logged<'_> {
        fn on_cache_hit(&self) {
            self.log.borrow_mut().push(format!("hit {}", self.name));
        }

        fn on_superseded(&self) {
            self.log.borrow_mut().push(format!("superseded {}", self.name));
        }
    }

    #[test]
    fn dropped_duplicates_are_told_they_were_superseded() {
        let cache = cache();
        cache
            .store()
            .write(&cache.fragment().expand("k2"), &"cachedB".to_string())
            .unwrap();
        let log = RefCell::new(Vec::new());
        let input: Vec<Logged<'_>> = [("A", "k1"), ("B", "k2"), ("C", "k1"), ("D", "k2")]
            .into_iter()
            .map(|(name, seed)| Logged { name, seed, log: &log })
            .collect();

        let mut payload = RenderPayload::default();
        let out = cache
            .render(input, &Cached::Default, &mut payload, |misses| {
                log.borrow_mut().push("render".to_string());
                Ok(misses.iter().map(|i| i.name.to_string()).collect())
            })
            .unwrap();

        assert_eq!(out, vec!["C".to_string(), "cachedB".to_string()]);
        assert_eq!(
            *log.borrow(),
            vec!["hit D", "superseded A", "superseded B", "render"]
        );
    }
}
