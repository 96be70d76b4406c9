//! Per-call caching options.

use std::fmt;

use rendercache_core::CacheKeySeed;

/// Whether and how a render call caches its items.
pub enum Cached<I> {
    /// Render every item, bypassing the store.
    Disabled,
    /// Seed each key from the item's own [`CacheKeySeed`].
    Default,
    /// Seed each key from a caller-supplied function.
    Seed(Box<dyn Fn(&I) -> String>),
}

impl<I> Cached<I> {
    /// Cache with a custom seed function.
    pub fn seed<F>(f: F) -> Self
    where
        F: Fn(&I) -> String + 'static,
    {
        Self::Seed(Box::new(f))
    }

    /// `Default` when `enabled`, `Disabled` otherwise.
    pub fn when(enabled: bool) -> Self {
        if enabled { Self::Default } else { Self::Disabled }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl<I: CacheKeySeed> Cached<I> {
    /// The key seed for `item`, or `None` when caching is disabled.
    pub fn seed_for(&self, item: &I) -> Option<String> {
        match self {
            Self::Disabled => None,
            Self::Default => Some(item.cache_key_seed()),
            Self::Seed(f) => Some(f(item)),
        }
    }
}

impl<I> Default for Cached<I> {
    fn default() -> Self {
        Self::Default
    }
}

impl<I> fmt::Debug for Cached<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Default => f.write_str("Default"),
            Self::Seed(_) => f.write_str("Seed(..)"),
        }
    }
}
