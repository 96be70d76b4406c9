//! Lazy association reads.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use rendercache_core::{AssociationSpec, Error, Result};

use crate::bulk_loader::SharedPreloader;
use crate::deferred::HasAssociations;
use crate::n1_detection::{N1QueryTracker, N1Stats};

/// Reads associations on records, batching through pending bulk loaders.
///
/// A read resolves in one of three ways:
///
/// 1. the association is already loaded on the record: no fetch
/// 2. the record's pending loader declares it: one batch fetch for the whole
///    (non-excluded) batch, after which siblings read it for free
/// 3. otherwise: a per-record fetch, counted by the N+1 tracker
pub struct AssociationReader<R> {
    preloader: SharedPreloader<R>,
    tracker: RefCell<N1QueryTracker>,
}

impl<R: HasAssociations + 'static> AssociationReader<R> {
    pub fn new(preloader: SharedPreloader<R>) -> Self {
        Self {
            preloader,
            tracker: RefCell::new(N1QueryTracker::new()),
        }
    }

    #[must_use]
    pub fn with_tracker(mut self, tracker: N1QueryTracker) -> Self {
        self.tracker = RefCell::new(tracker);
        self
    }

    pub fn tracker(&self) -> Ref<'_, N1QueryTracker> {
        self.tracker.borrow()
    }

    pub fn n1_stats(&self) -> N1Stats {
        self.tracker.borrow().stats()
    }

    /// The targets of `name` on `record`, loading them if needed.
    ///
    /// # Errors
    ///
    /// Propagates preloader failures, e.g. an association the record does not define.
    #[track_caller]
    pub fn read(&self, record: &Rc<R>, name: &str) -> Result<Vec<Rc<R>>> {
        if let Some(targets) = record.association_target(name) {
            return Ok(targets);
        }

        if let Some(loader) = record.pending_loader().get() {
            if loader.loads(name) {
                loader.load(name)?;
                return Ok(record.association_target(name).unwrap_or_default());
            }
        }

        let identity = record.identity();
        tracing::debug!(
            target: "rendercache::preload",
            record = %identity,
            association = name,
            "Per-record association load"
        );
        self.tracker
            .borrow_mut()
            .record_load(identity.table(), name);

        let result = {
            let mut preloader = self.preloader.try_borrow_mut().map_err(|_| {
                Error::Custom(format!(
                    "preloader is already in use while reading '{}' on {}",
                    name, identity
                ))
            })?;
            preloader.preload(std::slice::from_ref(record), &AssociationSpec::name(name))?
        };
        Ok(record.association_target(name).unwrap_or(result.records))
    }

    /// Read `name` on the first target only, for singular associations.
    #[track_caller]
    pub fn read_one(&self, record: &Rc<R>, name: &str) -> Result<Option<Rc<R>>> {
        Ok(self.read(record, name)?.into_iter().next())
    }
}
