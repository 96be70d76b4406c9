//! A dynamically-typed record.
//!
//! [`Record`] is the record type used by [`MemoryPreloader`](crate::MemoryPreloader)
//! and by callers that work with rows as JSON attribute maps rather than typed
//! models. It carries its loaded associations and a pending-loader slot, so it
//! takes part in deferred bulk loading like any typed record.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rendercache_core::{CacheKeySeed, Error, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::deferred::{Deferrable, HasAssociations, PendingLoader, RecordIdentity};

/// Attribute that versions a record's cache key seed, when present.
pub const VERSION_ATTRIBUTE: &str = "updated_at";

/// A row of `table` with primary key `id` and JSON attributes.
pub struct Record {
    table: String,
    id: i64,
    attributes: Map<String, Value>,
    associations: RefCell<IndexMap<String, Vec<Rc<Record>>>>,
    pending: PendingLoader<Record>,
}

impl Record {
    pub fn new(table: impl Into<String>, id: i64) -> Self {
        Self {
            table: table.into(),
            id,
            attributes: Map::new(),
            associations: RefCell::new(IndexMap::new()),
            pending: PendingLoader::new(),
        }
    }

    /// Set an attribute (builder style).
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Build a record from a JSON object with an integer `"id"` member.
    ///
    /// The `id` member becomes the primary key; every other member becomes an
    /// attribute.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serde` if `value` is not an object or has no integer id.
    pub fn from_json(table: impl Into<String>, value: Value) -> Result<Self> {
        let table = table.into();
        let Value::Object(mut attributes) = value else {
            return Err(Error::Serde(format!(
                "expected a JSON object for a '{}' record",
                table
            )));
        };
        let id = attributes
            .remove("id")
            .and_then(|id| id.as_i64())
            .ok_or_else(|| Error::Serde(format!("'{}' record has no integer id", table)))?;
        Ok(Self {
            table,
            id,
            attributes,
            associations: RefCell::new(IndexMap::new()),
            pending: PendingLoader::new(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Integer attribute, e.g. a foreign key.
    pub fn attribute_i64(&self, name: &str) -> Option<i64> {
        self.attribute(name).and_then(Value::as_i64)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Names of the associations loaded on this record, in load order.
    pub fn loaded_associations(&self) -> Vec<String> {
        self.associations.borrow().keys().cloned().collect()
    }

    pub fn into_shared(self) -> Rc<Self> {
        Rc::new(self)
    }
}

impl Deferrable for Record {
    fn identity(&self) -> RecordIdentity {
        RecordIdentity::new(self.table.clone(), self.id)
    }

    fn pending_loader(&self) -> &PendingLoader<Self> {
        &self.pending
    }
}

impl HasAssociations for Record {
    fn association_target(&self, name: &str) -> Option<Vec<Rc<Self>>> {
        self.associations.borrow().get(name).cloned()
    }

    fn set_association_target(&self, name: &str, targets: Vec<Rc<Self>>) {
        self.associations
            .borrow_mut()
            .insert(name.to_string(), targets);
    }
}

/// `"<table>/<id>"`, or `"<table>/<id>-<updated_at>"` when the record is versioned.
impl CacheKeySeed for Record {
    fn cache_key_seed(&self) -> String {
        match self.attribute(VERSION_ATTRIBUTE) {
            Some(Value::Null) | None => format!("{}/{}", self.table, self.id),
            Some(version) => format!(
                "{}/{}-{}",
                self.table,
                self.id,
                version.cache_key_seed()
            ),
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.table)
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("associations", &self.loaded_associations())
            .field("pending", &self.pending)
            .finish()
    }
}

/// Serializes `id`, the attributes, and every loaded association as nested
/// records. The loaded association graph must be acyclic.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let associations = self.associations.borrow();
        let mut map =
            serializer.serialize_map(Some(1 + self.attributes.len() + associations.len()))?;
        map.serialize_entry("id", &self.id)?;
        for (name, value) in &self.attributes {
            map.serialize_entry(name, value)?;
        }
        for (name, targets) in associations.iter() {
            let targets: Vec<&Record> = targets.iter().map(|t| t.as_ref()).collect();
            map.serialize_entry(name, &targets)?;
        }
        map.end()
    }
}
