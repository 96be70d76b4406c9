//! Core types for rendercache.
//!
//! This crate holds the vocabulary shared by the preloading and collection
//! caching layers:
//!
//! - `Error` / `Result` for every fallible operation
//! - `CacheKey`, `CacheKeySeed` and `FragmentKey` for key derivation
//! - `AssociationSpec` for declaring nested bulk loads

pub mod association;
pub mod error;
pub mod key;

pub use association::{AssociationSpec, is_valid_association_name};
pub use error::{
    ConfigError, Error, PreloadError, PreloadErrorKind, RenderError, RenderErrorKind, Result,
    StoreError, StoreErrorKind,
};
pub use key::{CacheKey, CacheKeySeed, FragmentKey, template_digest};
