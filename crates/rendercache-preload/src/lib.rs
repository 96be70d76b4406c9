//! Deferred, path-aware bulk association loading.
//!
//! Records reached through a [`Relation`] carry a pending [`BulkLoader`]. The
//! first read of a declared association on any record loads it for the whole
//! batch in one [`Preloader`] call, and the loaded records get a child loader
//! for the next level of the spec. Records whose output turns out to be cached
//! are excluded before anything fires, so only the records that are actually
//! rendered pay for their associations.

pub mod bulk_loader;
pub mod deferred;
pub mod memory;
pub mod n1_detection;
pub mod reader;
pub mod record;
pub mod relation;

pub use bulk_loader::{BatchLoadResult, BulkLoader, Preloader, SharedPreloader};
pub use deferred::{Deferrable, HasAssociations, PendingLoader, RecordIdentity};
pub use memory::{AssociationKind, MemoryPreloader, PreloadCall};
pub use n1_detection::{CallSite, N1DetectionScope, N1QueryTracker, N1Stats};
pub use reader::AssociationReader;
pub use record::Record;
pub use relation::{PreloadMode, Relation};
