//! In-memory relational source.
//!
//! [`MemoryPreloader`] stores [`Record`]s per table and resolves two kinds of
//! associations against them:
//!
//! - `belongs_to`: the owner holds the foreign key (`posts.author_id -> authors.id`)
//! - `has_many`: the target holds the foreign key (`posts.id <- comments.post_id`)
//!
//! Each batch load is logged as one [`PreloadCall`] per (table, association),
//! the same granularity as one `SELECT ... WHERE fk IN (...)` against a
//! database, so tests can assert how many round trips a render cost.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;
use rendercache_core::{AssociationSpec, Error, Result};

use crate::bulk_loader::{BatchLoadResult, Preloader};
use crate::deferred::{Deferrable, HasAssociations, RecordIdentity};
use crate::record::Record;

/// How an association maps records of one table to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationKind {
    /// The owner's `foreign_key` attribute holds the target's id.
    BelongsTo { target: String, foreign_key: String },
    /// Targets whose `foreign_key` attribute equals the owner's id.
    HasMany { target: String, foreign_key: String },
}

impl AssociationKind {
    pub fn target(&self) -> &str {
        match self {
            Self::BelongsTo { target, .. } | Self::HasMany { target, .. } => target,
        }
    }
}

/// One batch fetch issued by the preloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadCall {
    pub table: String,
    pub association: String,
    /// Owner ids the fetch was issued for, in batch order.
    pub ids: Vec<i64>,
}

/// Tables of records plus association definitions.
#[derive(Debug, Default)]
pub struct MemoryPreloader {
    tables: IndexMap<String, Vec<Rc<Record>>>,
    associations: HashMap<(String, String), AssociationKind>,
    calls: Vec<PreloadCall>,
}

impl MemoryPreloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record into its table and return the shared handle.
    pub fn insert(&mut self, record: Record) -> Rc<Record> {
        let record = Rc::new(record);
        self.tables
            .entry(record.table().to_string())
            .or_default()
            .push(Rc::clone(&record));
        record
    }

    /// Declare `owner.name` as a belongs-to association.
    pub fn belongs_to(
        &mut self,
        owner: &str,
        name: &str,
        target: &str,
        foreign_key: &str,
    ) -> &mut Self {
        self.define(
            owner,
            name,
            AssociationKind::BelongsTo {
                target: target.to_string(),
                foreign_key: foreign_key.to_string(),
            },
        )
    }

    /// Declare `owner.name` as a has-many association.
    pub fn has_many(
        &mut self,
        owner: &str,
        name: &str,
        target: &str,
        foreign_key: &str,
    ) -> &mut Self {
        self.define(
            owner,
            name,
            AssociationKind::HasMany {
                target: target.to_string(),
                foreign_key: foreign_key.to_string(),
            },
        )
    }

    fn define(&mut self, owner: &str, name: &str, kind: AssociationKind) -> &mut Self {
        self.associations
            .insert((owner.to_string(), name.to_string()), kind);
        self
    }

    pub fn association(&self, owner: &str, name: &str) -> Option<&AssociationKind> {
        self.associations
            .get(&(owner.to_string(), name.to_string()))
    }

    /// Every record of `table`, in insertion order.
    pub fn all(&self, table: &str) -> Vec<Rc<Record>> {
        self.tables.get(table).cloned().unwrap_or_default()
    }

    pub fn find(&self, table: &str, id: i64) -> Option<Rc<Record>> {
        self.tables
            .get(table)
            .and_then(|rows| rows.iter().find(|r| r.id() == id).cloned())
    }

    /// Batch fetches issued so far.
    pub fn calls(&self) -> &[PreloadCall] {
        &self.calls
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn reset_calls(&mut self) {
        self.calls.clear();
    }

    fn resolve(&self, owner: &Record, kind: &AssociationKind) -> Vec<Rc<Record>> {
        let rows = self.tables.get(kind.target());
        let rows = rows.map(Vec::as_slice).unwrap_or_default();
        match kind {
            AssociationKind::BelongsTo { foreign_key, .. } => {
                match owner.attribute_i64(foreign_key) {
                    Some(fk) => rows.iter().filter(|r| r.id() == fk).cloned().collect(),
                    None => Vec::new(),
                }
            }
            AssociationKind::HasMany { foreign_key, .. } => rows
                .iter()
                .filter(|r| r.attribute_i64(foreign_key) == Some(owner.id()))
                .cloned()
                .collect(),
        }
    }

    /// Load `name` for `records`, one call per owner table.
    fn load_association(&mut self, records: &[Rc<Record>], name: &str) -> Result<Vec<Rc<Record>>> {
        let mut by_table: IndexMap<&str, Vec<&Rc<Record>>> = IndexMap::new();
        for record in records {
            by_table.entry(record.table()).or_default().push(record);
        }

        let mut seen: HashSet<RecordIdentity> = HashSet::new();
        let mut loaded = Vec::new();
        for (table, owners) in by_table {
            let kind = self
                .association(table, name)
                .cloned()
                .ok_or_else(|| Error::unknown_association(name, table))?;

            self.calls.push(PreloadCall {
                table: table.to_string(),
                association: name.to_string(),
                ids: owners.iter().map(|r| r.id()).collect(),
            });
            tracing::trace!(
                target: "rendercache::preload",
                table = table,
                association = name,
                owners = owners.len(),
                "Memory preload"
            );

            for owner in owners {
                let targets = self.resolve(owner, &kind);
                for target in &targets {
                    if seen.insert(target.identity()) {
                        loaded.push(Rc::clone(target));
                    }
                }
                owner.set_association_target(name, targets);
            }
        }
        Ok(loaded)
    }
}

impl Preloader<Record> for MemoryPreloader {
    /// Loads every name declared at the top of `spec`, then whatever each
    /// mapping nests under it on the loaded records.
    fn preload(
        &mut self,
        records: &[Rc<Record>],
        spec: &AssociationSpec,
    ) -> Result<BatchLoadResult<Record>> {
        let mut out = Vec::new();
        if records.is_empty() {
            return Ok(BatchLoadResult::new(out));
        }
        for name in spec.children() {
            let loaded = self.load_association(records, name)?;
            if let Some(nested) = spec.descend(name).filter(|n| !n.is_empty()) {
                self.preload(&loaded, nested)?;
            }
            out.extend(loaded);
        }
        Ok(BatchLoadResult::new(out))
    }
}
