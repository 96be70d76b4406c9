//! rendercache - collection render caching with deferred bulk association loading.
//!
//! Rendering a collection of records usually costs two things per record: the
//! template itself, and the associations the template reads. rendercache
//! caches the rendered fragment of each record and makes sure the association
//! loads are only paid for records that actually miss the cache:
//!
//! - Every record is expanded into a fragment key and all keys are fetched
//!   with one batch read.
//! - Records that hit are excluded from their pending bulk loaders.
//! - The misses get their associations in one batch per association path,
//!   then are rendered with a single callback invocation.
//! - Output keeps the collection's order, and fresh fragments are written back.
//!
//! # Quick Start
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use rendercache::prelude::*;
//!
//! let mut db = MemoryPreloader::new();
//! db.insert(Record::new("authors", 1).with_attribute("name", "Ann"));
//! for id in 1..=3 {
//!     db.insert(Record::new("posts", id).with_attribute("author_id", 1));
//! }
//! db.belongs_to("posts", "author", "authors", "author_id");
//!
//! let posts = db.all("posts");
//! let db = Rc::new(RefCell::new(db));
//! let preloader: SharedPreloader<Record> = db.clone();
//! let mut relation = Relation::new(posts, preloader).preload("author");
//!
//! let cache = CollectionRenderCache::new(
//!     MemoryStore::new(100),
//!     FragmentKey::new("posts/_post").template_source("<li>{{title}}</li>"),
//! );
//!
//! let mut payload = RenderPayload::default();
//! let html = render_relation(&cache, &mut relation, &Cached::Default, &mut payload, |posts| {
//!     Ok(posts.iter().map(|p| format!("<li>post {}</li>", p.id())).collect())
//! })?;
//!
//! assert_eq!(html.len(), 3);
//! assert_eq!(payload.written, 3);
//! assert_eq!(db.borrow().call_count(), 1);
//! # Ok::<(), rendercache::Error>(())
//! ```

pub mod global_store;
pub mod partial;

pub use rendercache_core::{
    AssociationSpec, CacheKey, CacheKeySeed, ConfigError, Error, FragmentKey, PreloadError,
    PreloadErrorKind, RenderError, RenderErrorKind, Result, StoreError, StoreErrorKind,
    is_valid_association_name, template_digest,
};

pub use rendercache_preload::{
    AssociationKind, AssociationReader, BatchLoadResult, BulkLoader, CallSite, Deferrable,
    HasAssociations, MemoryPreloader, N1DetectionScope, N1QueryTracker, N1Stats, PendingLoader,
    PreloadCall, PreloadMode, Preloader, Record, RecordIdentity, Relation, SharedPreloader,
};

pub use rendercache_collection::{
    CacheStore, Cached, CollectionCacheConfig, CollectionItem, CollectionRenderCache,
    KeyedCollection, MemoryStore, RenderPayload, StoreStats,
};

pub use global_store::{SharedStore, collection_cache, has_collection_cache, set_collection_cache};
pub use partial::{global_render_cache, render_relation};

/// Prelude module for convenient imports.
///
/// ```
/// use rendercache::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AssociationReader, AssociationSpec, BulkLoader, CacheKey, CacheKeySeed, CacheStore,
        Cached, CollectionCacheConfig, CollectionItem, CollectionRenderCache, Deferrable, Error,
        FragmentKey, HasAssociations, MemoryPreloader, MemoryStore, Preloader, Record, Relation,
        RenderPayload, Result, SharedPreloader, render_relation,
    };
}
