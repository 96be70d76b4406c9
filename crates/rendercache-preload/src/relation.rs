//! Record sets with an eager or deferred association spec.
//!
//! A [`Relation`] pairs records with the associations they should come with.
//! In eager mode [`Relation::load`] batch-loads the whole spec up front. In
//! deferred mode it only attaches a root [`BulkLoader`] to every record; each
//! association is then loaded for the batch on first access, and records that
//! were excluded in the meantime (cache hits) are left out.

use std::rc::Rc;

use rendercache_core::{AssociationSpec, Result};

use crate::bulk_loader::{BulkLoader, SharedPreloader};
use crate::deferred::Deferrable;

/// When a relation's associations are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreloadMode {
    /// Everything in the spec is loaded by `load`.
    #[default]
    Eager,
    /// `load` attaches a bulk loader; associations load on first access.
    Deferred,
}

/// A set of records plus the associations to load with them.
pub struct Relation<R> {
    records: Vec<Rc<R>>,
    spec: Option<Rc<AssociationSpec>>,
    mode: PreloadMode,
    preloader: SharedPreloader<R>,
    root: Option<Rc<BulkLoader<R>>>,
    loaded: bool,
}

impl<R: Deferrable + 'static> Relation<R> {
    pub fn new(records: Vec<Rc<R>>, preloader: SharedPreloader<R>) -> Self {
        Self {
            records,
            spec: None,
            mode: PreloadMode::Eager,
            preloader,
            root: None,
            loaded: false,
        }
    }

    /// Load `spec` eagerly when the relation loads.
    #[must_use]
    pub fn preload(mut self, spec: impl Into<AssociationSpec>) -> Self {
        self.spec = Some(Rc::new(spec.into()));
        self.mode = PreloadMode::Eager;
        self
    }

    /// Load `spec` lazily, one batch per association path, on first access.
    #[must_use]
    pub fn bulk_load(mut self, spec: impl Into<AssociationSpec>) -> Self {
        self.spec = Some(Rc::new(spec.into()));
        self.mode = PreloadMode::Deferred;
        self
    }

    /// Switch to deferred mode so cache hits can be excluded before anything is fetched.
    ///
    /// Has no effect once the relation is loaded. Returns whether the relation
    /// is now deferring.
    pub fn defer_preloading(&mut self) -> bool {
        if self.loaded {
            return self.mode == PreloadMode::Deferred;
        }
        self.mode = PreloadMode::Deferred;
        true
    }

    pub fn mode(&self) -> PreloadMode {
        self.mode
    }

    pub fn spec(&self) -> Option<&AssociationSpec> {
        self.spec.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Load the relation.
    ///
    /// Eager: runs every batch load in the spec. Deferred: attaches the root
    /// loader to every record. Loading twice does nothing.
    #[tracing::instrument(level = "debug", skip(self), fields(records = self.records.len(), mode = ?self.mode))]
    pub fn load(&mut self) -> Result<&[Rc<R>]> {
        if self.loaded {
            return Ok(&self.records);
        }

        if let Some(spec) = self.spec.as_ref().filter(|s| !s.is_empty()) {
            let root = BulkLoader::new(
                self.records.clone(),
                Rc::clone(spec),
                Rc::clone(&self.preloader),
            );
            match self.mode {
                PreloadMode::Eager => {
                    let loads = root.load_all()?;
                    tracing::debug!(target: "rendercache::preload", loads, "Eager preload complete");
                }
                PreloadMode::Deferred => {
                    root.attach();
                    tracing::debug!(target: "rendercache::preload", "Deferred preloading attached");
                }
            }
            self.root = Some(root);
        }
        self.loaded = true;
        Ok(&self.records)
    }

    /// Fire the deferred root loader for every record still in its batch.
    ///
    /// Returns the number of batch loads performed. Eager or spec-less
    /// relations have nothing pending and return 0.
    pub fn preload_deferred(&self) -> Result<usize> {
        match (&self.root, self.mode) {
            (Some(root), PreloadMode::Deferred) => root.load_all(),
            _ => Ok(0),
        }
    }

    /// The root bulk loader, once loaded with a non-empty spec.
    pub fn root_loader(&self) -> Option<&Rc<BulkLoader<R>>> {
        self.root.as_ref()
    }

    /// The records (loaded or not).
    pub fn records(&self) -> &[Rc<R>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rc<R>> {
        self.records.iter()
    }
}

impl<'a, R: Deferrable + 'static> IntoIterator for &'a Relation<R> {
    type Item = &'a Rc<R>;
    type IntoIter = std::slice::Iter<'a, Rc<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<R> std::fmt::Debug for Relation<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relation")
            .field("records", &self.records.len())
            .field("spec", &self.spec)
            .field("mode", &self.mode)
            .field("loaded", &self.loaded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::HasAssociations;
    use crate::memory::MemoryPreloader;
    use crate::reader::AssociationReader;
    use crate::record::Record;
    use std::cell::RefCell;

    fn library() -> (Rc<RefCell<MemoryPreloader>>, SharedPreloader<Record>) {
        let mut db = MemoryPreloader::new();
        db.insert(Record::new("authors", 1).with_attribute("name", "Ann"));
        for id in 1..=3 {
            db.insert(Record::new("books", id).with_attribute("author_id", 1));
        }
        db.belongs_to("books", "author", "authors", "author_id");
        let db = Rc::new(RefCell::new(db));
        let shared: SharedPreloader<Record> = db.clone();
        (db, shared)
    }

    #[test]
    fn eager_preload_loads_on_load() {
        let (db, shared) = library();
        let books = db.borrow().all("books");
        let mut relation = Relation::new(books, shared).preload("author");
        relation.load().unwrap();

        assert_eq!(db.borrow().call_count(), 1);
        assert!(relation.iter().all(|b| b.is_association_loaded("author")));
        assert_eq!(relation.preload_deferred().unwrap(), 0);
    }

    #[test]
    fn deferred_preloading_skips_excluded_records() {
        let (db, shared) = library();
        let books = db.borrow().all("books");
        let mut relation = Relation::new(books, shared.clone()).preload("author");
        assert!(relation.defer_preloading());
        relation.load().unwrap();
        assert_eq!(db.borrow().call_count(), 0);

        relation.records()[0].exclude_from_preloading();
        let reader = AssociationReader::new(shared);
        reader.read(&relation.records()[1], "author").unwrap();

        assert!(!relation.records()[0].is_association_loaded("author"));
        assert!(relation.records()[1].is_association_loaded("author"));
        assert!(relation.records()[2].is_association_loaded("author"));
        assert_eq!(db.borrow().calls()[0].ids, vec![2, 3]);
    }

    #[test]
    fn preload_deferred_loads_misses_only() {
        let (db, shared) = library();
        let books = db.borrow().all("books");
        let mut relation = Relation::new(books, shared).bulk_load("author");
        relation.load().unwrap();
        relation.records()[2].mark_as_cache_hit();

        assert_eq!(relation.preload_deferred().unwrap(), 1);
        assert_eq!(db.borrow().calls()[0].ids, vec![1, 2]);
        assert_eq!(relation.preload_deferred().unwrap(), 0);
    }

    #[test]
    fn defer_after_load_has_no_effect() {
        let (db, shared) = library();
        let books = db.borrow().all("books");
        let mut relation = Relation::new(books, shared).preload("author");
        relation.load().unwrap();
        assert!(!relation.defer_preloading());
        assert_eq!(relation.mode(), PreloadMode::Eager);
    }

    #[test]
    fn spec_less_relation_has_no_loader() {
        let (db, shared) = library();
        let books = db.borrow().all("books");
        let mut relation = Relation::new(books, shared);
        assert_eq!(relation.load().unwrap().len(), 3);
        assert!(relation.root_loader().is_none());
        assert!(relation.is_loaded());
        assert!(!relation.records()[0].has_pending_loader());
    }
}
