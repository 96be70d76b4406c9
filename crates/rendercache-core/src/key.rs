//! Cache key definitions and fragment key derivation.
//!
//! Every item of a cached collection is turned into a [`CacheKey`] in two steps:
//! the item provides a *seed* (its own [`CacheKeySeed`], or a caller-supplied
//! seed function), and a [`FragmentKey`] combines that seed with the template's
//! virtual path and digest. Changing the template source therefore changes every
//! key derived through it.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the template SHA-256.
const DIGEST_HEX_LEN: usize = 32;

/// A fully expanded cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Create a key from any string-like value, used verbatim.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key and return the underlying string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A value that can seed a fragment cache key.
///
/// Records usually seed with `"<table>/<id>-<version>"`; plain values seed with
/// their own textual form.
pub trait CacheKeySeed {
    fn cache_key_seed(&self) -> String;
}

impl CacheKeySeed for str {
    fn cache_key_seed(&self) -> String {
        self.to_string()
    }
}

impl CacheKeySeed for String {
    fn cache_key_seed(&self) -> String {
        self.clone()
    }
}

impl CacheKeySeed for CacheKey {
    fn cache_key_seed(&self) -> String {
        self.0.clone()
    }
}

impl<T: CacheKeySeed + ?Sized> CacheKeySeed for &T {
    fn cache_key_seed(&self) -> String {
        (**self).cache_key_seed()
    }
}

impl<T: CacheKeySeed + ?Sized> CacheKeySeed for std::rc::Rc<T> {
    fn cache_key_seed(&self) -> String {
        (**self).cache_key_seed()
    }
}

impl<T: CacheKeySeed + ?Sized> CacheKeySeed for std::sync::Arc<T> {
    fn cache_key_seed(&self) -> String {
        (**self).cache_key_seed()
    }
}

macro_rules! impl_seed_via_display {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CacheKeySeed for $ty {
                fn cache_key_seed(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_seed_via_display!(i32, i64, u32, u64, usize);

impl CacheKeySeed for serde_json::Value {
    fn cache_key_seed(&self) -> String {
        match self {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Seeds made of several parts join them with `/`.
impl<T: CacheKeySeed> CacheKeySeed for [T] {
    fn cache_key_seed(&self) -> String {
        self.iter()
            .map(CacheKeySeed::cache_key_seed)
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl<T: CacheKeySeed> CacheKeySeed for Vec<T> {
    fn cache_key_seed(&self) -> String {
        self.as_slice().cache_key_seed()
    }
}

/// Compute the digest of a template source.
///
/// Returns the first 32 hex characters of its SHA-256.
pub fn template_digest(source: &str) -> String {
    let hash = Sha256::digest(source.as_bytes());
    let mut hex = String::with_capacity(DIGEST_HEX_LEN);
    for byte in hash.iter().take(DIGEST_HEX_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Derives fragment cache keys for one template.
///
/// Keys have the shape `[namespace/]views/<virtual_path>[:<digest>]/<seed>`.
///
/// # Example
///
/// ```
/// use rendercache_core::FragmentKey;
///
/// let keys = FragmentKey::new("posts/_post").digest("abc123");
/// assert_eq!(keys.expand("posts/1").as_str(), "views/posts/_post:abc123/posts/1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentKey {
    namespace: Option<String>,
    virtual_path: String,
    digest: Option<String>,
}

impl FragmentKey {
    /// Create a key builder for the template at `virtual_path`, without a digest.
    pub fn new(virtual_path: impl Into<String>) -> Self {
        Self {
            namespace: None,
            virtual_path: virtual_path.into(),
            digest: None,
        }
    }

    /// Set the digest from the template source.
    pub fn template_source(mut self, source: &str) -> Self {
        self.digest = Some(template_digest(source));
        self
    }

    /// Set a precomputed digest.
    pub fn digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    /// Prefix every key with `namespace/`.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.namespace = if namespace.is_empty() {
            None
        } else {
            Some(namespace)
        };
        self
    }

    /// The template's virtual path.
    pub fn virtual_path(&self) -> &str {
        &self.virtual_path
    }

    /// The template digest, if one was configured.
    pub fn template_digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Expand a seed string into a full cache key.
    pub fn expand(&self, seed: &str) -> CacheKey {
        let mut key = String::with_capacity(
            self.virtual_path.len() + seed.len() + DIGEST_HEX_LEN + 16,
        );
        if let Some(ns) = &self.namespace {
            key.push_str(ns);
            key.push('/');
        }
        key.push_str("views/");
        key.push_str(&self.virtual_path);
        if let Some(digest) = &self.digest {
            key.push(':');
            key.push_str(digest);
        }
        key.push('/');
        key.push_str(seed);
        CacheKey(key)
    }

    /// Expand any seedable value into a full cache key.
    pub fn expand_seed<S: CacheKeySeed + ?Sized>(&self, seed: &S) -> CacheKey {
        self.expand(&seed.cache_key_seed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn cache_key_borrows_as_str() {
        let mut map: HashMap<CacheKey, u32> = HashMap::new();
        map.insert(CacheKey::new("views/a"), 1);
        assert_eq!(map.get("views/a"), Some(&1));
        assert_eq!(CacheKey::from("x").to_string(), "x");
    }

    #[test]
    fn seeds_for_plain_values() {
        assert_eq!(42_i64.cache_key_seed(), "42");
        assert_eq!("post".cache_key_seed(), "post");
        assert_eq!(vec!["a", "b"].cache_key_seed(), "a/b");
        assert_eq!(serde_json::json!("s").cache_key_seed(), "s");
        assert_eq!(serde_json::json!({"id": 1}).cache_key_seed(), "{\"id\":1}");
    }

    #[test]
    fn digest_is_stable_and_truncated() {
        let a = template_digest("<li><%= post.title %></li>");
        let b = template_digest("<li><%= post.title %></li>");
        let c = template_digest("<li><%= post.body %></li>");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn fragment_key_shapes() {
        let plain = FragmentKey::new("posts/_post");
        assert_eq!(plain.expand("posts/1").as_str(), "views/posts/_post/posts/1");

        let full = FragmentKey::new("posts/_post")
            .digest("d1")
            .namespace("blog");
        assert_eq!(full.expand("7").as_str(), "blog/views/posts/_post:d1/7");

        let cleared = full.clone().namespace("");
        assert_eq!(cleared.expand("7").as_str(), "views/posts/_post:d1/7");
    }

    #[test]
    fn template_source_changes_keys() {
        let v1 = FragmentKey::new("t").template_source("one");
        let v2 = FragmentKey::new("t").template_source("two");
        assert_ne!(v1.expand_seed(&1_i64), v2.expand_seed(&1_i64));
        assert_eq!(v1.template_digest().map(str::len), Some(32));
    }
}
