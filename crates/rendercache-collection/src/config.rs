//! Collection cache configuration.
//!
//! Configuration can be built in code or deserialized from JSON; every field
//! has a default, so a partial document is enough:
//!
//! ```
//! use rendercache_collection::CollectionCacheConfig;
//!
//! let config = CollectionCacheConfig::from_json(r#"{"namespace": "v2"}"#).unwrap();
//! assert!(config.enabled);
//! assert_eq!(config.namespace.as_deref(), Some("v2"));
//! ```

use rendercache_core::{Error, FragmentKey, Result};
use serde::{Deserialize, Serialize};

use crate::store::MemoryStore;

/// Default capacity of the bundled in-memory store.
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Settings shared by every cached collection render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionCacheConfig {
    /// Master switch; when false every render bypasses the store
    pub enabled: bool,
    /// Prefix for every fragment key
    pub namespace: Option<String>,
    /// Capacity of the in-memory store
    pub max_entries: usize,
    /// Include the template digest in fragment keys
    pub template_digest: bool,
}

impl Default for CollectionCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: None,
            max_entries: DEFAULT_MAX_ENTRIES,
            template_digest: true,
        }
    }
}

impl CollectionCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the master switch.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the key namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the in-memory store capacity.
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Include or omit the template digest in keys.
    pub fn template_digest(mut self, include: bool) -> Self {
        self.template_digest = include;
        self
    }

    /// Reject namespaces that would produce ambiguous keys.
    pub fn validate(&self) -> Result<()> {
        if let Some(ns) = &self.namespace {
            if ns.starts_with('/') || ns.ends_with('/') {
                return Err(Error::config(format!(
                    "namespace '{}' must not start or end with '/'",
                    ns
                )));
            }
            if ns.chars().any(char::is_whitespace) {
                return Err(Error::config(format!(
                    "namespace '{}' must not contain whitespace",
                    ns
                )));
            }
        }
        Ok(())
    }

    /// Key builder for the template at `virtual_path` with source `template_source`.
    pub fn fragment_key(&self, virtual_path: &str, template_source: &str) -> FragmentKey {
        let mut key = FragmentKey::new(virtual_path);
        if self.template_digest {
            key = key.template_source(template_source);
        }
        if let Some(ns) = &self.namespace {
            key = key.namespace(ns.clone());
        }
        key
    }

    /// An empty in-memory store sized by `max_entries`.
    pub fn memory_store<O>(&self) -> MemoryStore<O> {
        MemoryStore::new(self.max_entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CollectionCacheConfig::default();
        assert!(config.enabled);
        assert!(config.template_digest);
        assert_eq!(config.max_entries, DEFAULT_MAX_ENTRIES);
        assert!(config.namespace.is_none());
        assert_eq!(CollectionCacheConfig::from_json("{}").unwrap(), config);
    }

    #[test]
    fn test_builder() {
        let config = CollectionCacheConfig::new()
            .enabled(false)
            .namespace("blog")
            .max_entries(8)
            .template_digest(false);
        assert!(!config.enabled);
        assert_eq!(config.namespace.as_deref(), Some("blog"));
        assert_eq!(config.memory_store::<String>().max_entries(), 8);
    }

    #[test]
    fn test_fragment_key_follows_settings() {
        let with_digest = CollectionCacheConfig::new().namespace("blog");
        let key = with_digest.fragment_key("posts/_post", "<li/>");
        assert!(key.expand("1").as_str().starts_with("blog/views/posts/_post:"));

        let without = CollectionCacheConfig::new().template_digest(false);
        let key = without.fragment_key("posts/_post", "<li/>");
        assert_eq!(key.expand("1").as_str(), "views/posts/_post/1");
    }

    #[test]
    fn test_invalid_namespace() {
        assert!(CollectionCacheConfig::from_json(r#"{"namespace": "/x"}"#).is_err());
        assert!(CollectionCacheConfig::from_json(r#"{"namespace": "a b"}"#).is_err());
        assert!(CollectionCacheConfig::from_json(r#"{"max_entries": "many"}"#).is_err());
    }
}
