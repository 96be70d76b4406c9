//! Path-scoped bulk association loading.
//!
//! A [`BulkLoader`] owns a batch of records, the root [`AssociationSpec`] and
//! the path of association names already traversed from the root. It answers
//! whether an association is declared at its path ([`BulkLoader::loads`]) and
//! loads it for the whole batch with a single call to the [`Preloader`]
//! ([`BulkLoader::load`]). Each load produces a child loader one level deeper,
//! attached to every record the load returned, so nested associations are
//! batch-loaded the same way:
//!
//! ```ignore
//! // spec: {"posts": "comments"}
//! let root = BulkLoader::new(authors, spec, preloader);
//! root.attach();
//!
//! // First read of any author's posts loads posts for every author at once.
//! let posts = reader.read(&authors[0], "posts")?;
//!
//! // Every post now carries the [posts] loader, so comments load in one batch too.
//! let comments = reader.read(&posts[0], "comments")?;
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rendercache_core::{AssociationSpec, Error, Result};

use crate::deferred::{Deferrable, RecordIdentity};

/// The batch-loading collaborator.
///
/// Implementations fetch the associations named by `spec` for all `records` in
/// one round trip, store the targets on each record, and return the loaded
/// target records.
pub trait Preloader<R> {
    /// Batch-load `spec` for `records`.
    ///
    /// # Errors
    ///
    /// Fails if `spec` names an association the records do not define, or if
    /// the underlying fetch fails.
    fn preload(&mut self, records: &[Rc<R>], spec: &AssociationSpec) -> Result<BatchLoadResult<R>>;
}

/// A preloader shared by every loader of one record tree.
pub type SharedPreloader<R> = Rc<RefCell<dyn Preloader<R>>>;

/// Records produced by a batch load, plus the loader scoped to them.
pub struct BatchLoadResult<R> {
    /// Loaded target records, without duplicates.
    pub records: Vec<Rc<R>>,
    /// The child loader attached to `records`, set by [`BulkLoader::load`].
    pub loader: Option<Rc<BulkLoader<R>>>,
}

impl<R> BatchLoadResult<R> {
    /// A result from a preloader (no loader attached yet).
    pub fn new(records: Vec<Rc<R>>) -> Self {
        Self {
            records,
            loader: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<R> Clone for BatchLoadResult<R> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            loader: self.loader.clone(),
        }
    }
}

impl<R> Default for BatchLoadResult<R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<R> fmt::Debug for BatchLoadResult<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchLoadResult")
            .field("records", &self.records.len())
            .field("loader", &self.loader.as_ref().map(|l| l.path().to_vec()))
            .finish()
    }
}

/// Batch loader for one (record batch, association path) pair.
pub struct BulkLoader<R> {
    records: Vec<Rc<R>>,
    spec: Rc<AssociationSpec>,
    path: Vec<String>,
    preloader: SharedPreloader<R>,
    excluded: RefCell<HashSet<RecordIdentity>>,
    loaded: RefCell<IndexMap<String, BatchLoadResult<R>>>,
}

impl<R> BulkLoader<R> {
    /// Association names traversed from the root to reach this loader.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The root spec this loader descends from.
    pub fn spec(&self) -> &AssociationSpec {
        &self.spec
    }

    /// The spec node addressed by this loader's path, if the path is declared.
    pub fn node(&self) -> Option<&AssociationSpec> {
        self.spec.node_at(&self.path)
    }

    /// The full batch, including excluded records.
    pub fn records(&self) -> &[Rc<R>] {
        &self.records
    }

    /// Is `name` declared as a direct child of this loader's path?
    ///
    /// A path that leaves the declared spec answers `false`; callers then
    /// fall back to per-record loading.
    pub fn loads(&self, name: &str) -> bool {
        self.node().is_some_and(|node| node.includes(name))
    }

    /// The root-relative nested spec for loading `name` at this path.
    pub fn scope(&self, name: &str) -> AssociationSpec {
        AssociationSpec::scoped(&self.path, name)
    }

    /// Has `name` already been loaded by this loader?
    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.borrow().contains_key(name)
    }

    /// The child loader produced by loading `name`, if it has been loaded.
    pub fn child(&self, name: &str) -> Option<Rc<BulkLoader<R>>> {
        self.loaded
            .borrow()
            .get(name)
            .and_then(|result| result.loader.clone())
    }

    pub fn excluded_count(&self) -> usize {
        self.excluded.borrow().len()
    }
}

impl<R: Deferrable> BulkLoader<R> {
    /// Remove `record` from the set of records this loader will batch-load.
    ///
    /// Returns `false` if it was already excluded.
    pub fn exclude(&self, record: &R) -> bool {
        let identity = record.identity();
        tracing::trace!(
            target: "rendercache::preload",
            record = %identity,
            path = ?self.path,
            "Excluding record from bulk load"
        );
        self.excluded.borrow_mut().insert(identity)
    }

    pub fn is_excluded(&self, record: &R) -> bool {
        self.excluded.borrow().contains(&record.identity())
    }

    /// The records that a load would fetch for: the batch minus exclusions.
    pub fn batch(&self) -> Vec<Rc<R>> {
        let excluded = self.excluded.borrow();
        self.records
            .iter()
            .filter(|record| !excluded.contains(&record.identity()))
            .cloned()
            .collect()
    }
}

impl<R: Deferrable + 'static> BulkLoader<R> {
    /// Create a root loader over `records`.
    pub fn new(
        records: Vec<Rc<R>>,
        spec: impl Into<Rc<AssociationSpec>>,
        preloader: SharedPreloader<R>,
    ) -> Rc<Self> {
        Self::with_path(records, spec.into(), Vec::new(), preloader)
    }

    /// Create a loader at `path` below the root of `spec`.
    ///
    /// Duplicate records (by identity) are kept once.
    pub fn with_path(
        records: Vec<Rc<R>>,
        spec: Rc<AssociationSpec>,
        path: Vec<String>,
        preloader: SharedPreloader<R>,
    ) -> Rc<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        let records: Vec<Rc<R>> = records
            .into_iter()
            .filter(|record| seen.insert(record.identity()))
            .collect();
        Rc::new(Self {
            records,
            spec,
            path,
            preloader,
            excluded: RefCell::new(HashSet::new()),
            loaded: RefCell::new(IndexMap::new()),
        })
    }

    /// Attach this loader to every record of its batch.
    pub fn attach(self: &Rc<Self>) {
        for record in &self.records {
            record.attach_pending_loader(self);
        }
    }

    /// Batch-load `name` for every non-excluded record.
    ///
    /// The records are the ones at this loader's depth, so the preloader is
    /// asked for the bare `name`; [`scope`](Self::scope) gives the
    /// root-relative form for the same load.
    ///
    /// Issues at most one preloader call per name; later calls return the
    /// first result. The returned result carries the child loader scoped to
    /// `path + [name]`, already attached to the loaded records.
    ///
    /// # Errors
    ///
    /// Preloader failures propagate with this loader's path attached.
    #[tracing::instrument(level = "debug", skip(self), fields(path = ?self.path))]
    pub fn load(self: &Rc<Self>, name: &str) -> Result<BatchLoadResult<R>> {
        if let Some(done) = self.loaded.borrow().get(name) {
            tracing::trace!(target: "rendercache::preload", association = name, "Already loaded");
            return Ok(done.clone());
        }

        let batch = self.batch();
        tracing::info!(
            target: "rendercache::preload",
            association = name,
            scope = ?self.scope(name),
            batch_size = batch.len(),
            excluded = self.excluded_count(),
            "Bulk loading association"
        );

        let fetched = if batch.is_empty() {
            BatchLoadResult::empty()
        } else {
            let mut preloader = self.preloader.try_borrow_mut().map_err(|_| {
                Error::Custom(format!(
                    "preloader is already in use while loading '{}'",
                    name
                ))
            })?;
            preloader
                .preload(&batch, &AssociationSpec::name(name))
                .map_err(|e| e.with_path(&self.path))?
        };

        let mut child_path = self.path.clone();
        child_path.push(name.to_string());
        let child = Self::with_path(
            fetched.records,
            Rc::clone(&self.spec),
            child_path,
            Rc::clone(&self.preloader),
        );
        child.attach();

        let result = BatchLoadResult {
            records: child.records.clone(),
            loader: Some(child),
        };
        tracing::debug!(
            target: "rendercache::preload",
            association = name,
            loaded = result.len(),
            "Bulk load complete"
        );
        self.loaded
            .borrow_mut()
            .insert(name.to_string(), result.clone());
        Ok(result)
    }

    /// Load every association declared at this path, then recurse into the
    /// child loaders.
    ///
    /// Returns the number of loads performed (names already loaded are not
    /// counted).
    pub fn load_all(self: &Rc<Self>) -> Result<usize> {
        let Some(node) = self.node() else {
            return Ok(0);
        };
        let names: Vec<String> = node.children().into_iter().map(String::from).collect();

        let mut performed = 0;
        for name in names {
            if !self.is_loaded(&name) {
                performed += 1;
            }
            let result = self.load(&name)?;
            if let Some(child) = result.loader {
                performed += child.load_all()?;
            }
        }
        Ok(performed)
    }
}

impl<R> fmt::Debug for BulkLoader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkLoader")
            .field("path", &self.path)
            .field("records", &self.records.len())
            .field("excluded", &self.excluded.borrow().len())
            .field("loaded", &self.loaded.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}
