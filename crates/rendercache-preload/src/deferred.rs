//! Records that can defer their association loads to a bulk loader.
//!
//! A deferrable record carries a [`PendingLoader`] slot. A [`BulkLoader`]
//! attaches itself to every record of its batch; when one record turns out not
//! to need its associations (typically because its rendered output came from
//! the cache), [`Deferrable::exclude_from_preloading`] removes it from the
//! loader's batch and clears the slot, so the record falls back to per-record
//! loading if it is ever read.
//!
//! The slot holds a weak reference. Loaders own their records (and their child
//! loaders), so a strong back-reference would form a cycle; the owner of the
//! root loader (usually a `Relation`) keeps the whole tree alive.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::bulk_loader::BulkLoader;

/// Identity of a record inside a batch: its table and primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordIdentity {
    table: String,
    id: i64,
}

impl RecordIdentity {
    pub fn new(table: impl Into<String>, id: i64) -> Self {
        Self {
            table: table.into(),
            id,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.table, self.id)
    }
}

/// The pending-loader slot of a deferrable record.
pub struct PendingLoader<R> {
    slot: RefCell<Option<Weak<BulkLoader<R>>>>,
}

impl<R> PendingLoader<R> {
    /// An empty slot.
    pub const fn new() -> Self {
        Self {
            slot: RefCell::new(None),
        }
    }

    /// Point the slot at `loader`, replacing any previous loader.
    pub fn attach(&self, loader: &Rc<BulkLoader<R>>) {
        *self.slot.borrow_mut() = Some(Rc::downgrade(loader));
    }

    /// The pending loader, if one is attached and still alive.
    pub fn get(&self) -> Option<Rc<BulkLoader<R>>> {
        self.slot.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Clear the slot and return the loader that was pending.
    pub fn take(&self) -> Option<Rc<BulkLoader<R>>> {
        self.slot.borrow_mut().take().and_then(|weak| weak.upgrade())
    }

    /// Is a live loader attached?
    pub fn is_pending(&self) -> bool {
        self.get().is_some()
    }
}

impl<R> Default for PendingLoader<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for PendingLoader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(loader) => f
                .debug_struct("PendingLoader")
                .field("path", &loader.path())
                .finish(),
            None => f.write_str("PendingLoader(none)"),
        }
    }
}

/// A record that participates in deferred bulk loading.
pub trait Deferrable: Sized {
    /// Identity used by loaders to track exclusions.
    fn identity(&self) -> RecordIdentity;

    /// The record's pending-loader slot.
    fn pending_loader(&self) -> &PendingLoader<Self>;

    /// Attach a bulk loader. Called by [`BulkLoader`]; last attachment wins.
    fn attach_pending_loader(&self, loader: &Rc<BulkLoader<Self>>) {
        self.pending_loader().attach(loader);
    }

    /// Does this record still wait on a bulk loader?
    fn has_pending_loader(&self) -> bool {
        self.pending_loader().is_pending()
    }

    /// Keep this record out of its pending loader's batch and clear the slot.
    ///
    /// Calling it with no pending loader does nothing.
    fn exclude_from_preloading(&self) {
        if let Some(loader) = self.pending_loader().take() {
            loader.exclude(self);
        }
    }

    /// Alias of [`exclude_from_preloading`](Self::exclude_from_preloading) used
    /// by the render cache for hits.
    fn mark_as_cache_hit(&self) {
        self.exclude_from_preloading();
    }
}

/// A deferrable record that caches loaded association targets.
pub trait HasAssociations: Deferrable {
    /// The loaded targets of `name`, or `None` if it has not been loaded.
    fn association_target(&self, name: &str) -> Option<Vec<Rc<Self>>>;

    /// Store the loaded targets of `name`.
    fn set_association_target(&self, name: &str, targets: Vec<Rc<Self>>);

    fn is_association_loaded(&self, name: &str) -> bool {
        self.association_target(name).is_some()
    }
}
