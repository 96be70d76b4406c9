//! Items expanded into their cache keys.

use std::collections::HashMap;

use indexmap::IndexMap;
use indexmap::map::Iter;
use rendercache_core::CacheKey;

/// An insertion-ordered mapping from cache key to item.
///
/// The key order is the order of the rendered output. Items that expand to a
/// key already present replace the earlier item, and the key keeps the
/// position of its first occurrence. Replaced items are kept aside as
/// [`superseded`](Self::superseded) since they are never rendered:
///
/// ```
/// use rendercache_collection::KeyedCollection;
/// use rendercache_core::CacheKey;
///
/// let keyed = KeyedCollection::expand(["A", "B", "C"], |item| {
///     CacheKey::new(if *item == "B" { "k2" } else { "k1" })
/// });
/// let keys: Vec<&str> = keyed.keys().map(CacheKey::as_str).collect();
/// assert_eq!(keys, ["k1", "k2"]);
/// assert_eq!(keyed.get("k1"), Some(&"C"));
/// assert_eq!(keyed.superseded().next().map(|(_, item)| *item), Some("A"));
/// ```
#[derive(Debug, Clone)]
pub struct KeyedCollection<I> {
    entries: IndexMap<CacheKey, I>,
    superseded: Vec<(CacheKey, I)>,
}

impl<I> KeyedCollection<I> {
    /// Expand `items` with `key_fn`, in iteration order.
    pub fn expand<T, F>(items: T, mut key_fn: F) -> Self
    where
        T: IntoIterator<Item = I>,
        F: FnMut(&I) -> CacheKey,
    {
        let items = items.into_iter();
        let mut entries = IndexMap::with_capacity(items.size_hint().0);
        let mut superseded = Vec::new();
        for item in items {
            let key = key_fn(&item);
            // IndexMap::insert keeps the existing slot for a repeated key.
            if let Some(replaced) = entries.insert(key.clone(), item) {
                tracing::debug!(
                    target: "rendercache::collection",
                    key = %key,
                    "Duplicate cache key, later item replaces earlier one"
                );
                superseded.push((key, replaced));
            }
        }
        Self {
            entries,
            superseded,
        }
    }

    /// Keys in expanded order.
    pub fn expanded_keys(&self) -> Vec<CacheKey> {
        self.entries.keys().cloned().collect()
    }

    pub fn keys(&self) -> indexmap::map::Keys<'_, CacheKey, I> {
        self.entries.keys()
    }

    pub fn get(&self, key: &str) -> Option<&I> {
        self.entries.get(key)
    }

    /// Items whose key is not in `hits`, in expanded order.
    pub fn missed_items<O>(&self, hits: &HashMap<CacheKey, O>) -> Vec<&I> {
        self.entries
            .iter()
            .filter(|(key, _)| !hits.contains_key(*key))
            .map(|(_, item)| item)
            .collect()
    }

    /// Items whose key is in `hits`, in expanded order.
    pub fn hit_items<O>(&self, hits: &HashMap<CacheKey, O>) -> Vec<&I> {
        self.entries
            .iter()
            .filter(|(key, _)| hits.contains_key(*key))
            .map(|(_, item)| item)
            .collect()
    }

    /// Consume the collection, keeping only the missed items.
    pub fn into_missed<O>(self, hits: &HashMap<CacheKey, O>) -> Vec<I> {
        self.entries
            .into_iter()
            .filter(|(key, _)| !hits.contains_key(key))
            .map(|(_, item)| item)
            .collect()
    }

    /// Number of items dropped because a later item expanded to the same key.
    pub fn collapsed(&self) -> usize {
        self.superseded.len()
    }

    /// Items dropped in favour of a later item with the same key, with that key.
    pub fn superseded(&self) -> impl Iterator<Item = (&CacheKey, &I)> {
        self.superseded.iter().map(|(key, item)| (key, item))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, CacheKey, I> {
        self.entries.iter()
    }
}

impl<'a, I> IntoIterator for &'a KeyedCollection<I> {
    type Item = (&'a CacheKey, &'a I);
    type IntoIter = Iter<'a, CacheKey, I>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
