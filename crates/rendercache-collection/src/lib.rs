//! Collection render caching.
//!
//! A [`CollectionRenderCache`] renders a collection through a fragment store:
//! one batch read for every item's key, one render callback for the misses,
//! output assembled in the original order, and the newly rendered fragments
//! written back. Items backed by deferrable records are told when they hit, so
//! their pending bulk association loads never include them.

pub mod config;
pub mod item;
pub mod keyed;
pub mod options;
pub mod render;
pub mod store;

pub use config::{CollectionCacheConfig, DEFAULT_MAX_ENTRIES};
pub use item::CollectionItem;
pub use keyed::KeyedCollection;
pub use options::Cached;
pub use render::{CollectionRenderCache, RenderPayload};
pub use store::{CacheStore, MemoryStore, StoreStats};
