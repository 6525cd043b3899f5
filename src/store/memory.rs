//! In-memory repository backend.
//!
//! Declared unique indexes are checked and the record committed under a
//! single lock, giving the same conflict-as-signal insert semantics as the
//! MongoDB backend. Backs the test suite and small self-contained
//! deployments; filters support top-level equality only, which is all the
//! core asks of [`Repository::find_all`].

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};

use crate::error::{Error, Result};

use super::{Id, Repository};

#[derive(Default)]
struct Collection {
    records: Vec<Document>,
    unique_indexes: Vec<Vec<String>>,
}

#[derive(Default)]
pub struct MemoryRepository {
    collections: Mutex<HashMap<String, Collection>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous index declaration, for wiring up before any task runs.
    pub fn declare_unique_index(&self, collection: &str, fields: &[&str]) {
        let mut collections = self.collections.lock().unwrap();
        let coll = collections.entry(collection.to_string()).or_default();
        let index: Vec<String> = fields.iter().map(|field| field.to_string()).collect();
        if !coll.unique_indexes.contains(&index) {
            coll.unique_indexes.push(index);
        }
    }
}

fn matches(record: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| record.get(key) == Some(expected))
}

/// True if `candidate` collides with `existing` on every field of the index.
fn collides(index: &[String], candidate: &Document, existing: &Document) -> bool {
    index
        .iter()
        .all(|field| match (candidate.get(field), existing.get(field)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        })
}

/// Extract the fields a patch assigns: either a bare partial document or a
/// single `$set`. Other update operators are not supported by this backend.
fn set_document(patch: Document) -> Result<Document> {
    if !patch.keys().any(|key| key.starts_with('$')) {
        return Ok(patch);
    }
    if patch.len() == 1 {
        if let Ok(set) = patch.get_document("$set") {
            return Ok(set.clone());
        }
    }
    Err(Error::Unavailable(
        "only $set updates are supported by the in-memory backend".to_string(),
    ))
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn ensure_unique_index(&self, collection: &str, fields: &[&str]) -> Result<()> {
        self.declare_unique_index(collection, fields);
        Ok(())
    }

    async fn insert(&self, collection: &str, mut record: Document) -> Result<Id> {
        let mut collections = self.collections.lock().unwrap();
        let coll = collections.entry(collection.to_string()).or_default();
        // Uniqueness is checked and the record committed under the same
        // lock; two racing inserts cannot both pass.
        for index in &coll.unique_indexes {
            if coll
                .records
                .iter()
                .any(|existing| collides(index, &record, existing))
            {
                return Err(Error::conflict("record violates a uniqueness constraint"));
            }
        }
        let id = match record.get("_id").and_then(Bson::as_object_id) {
            Some(oid) => Id::from(oid),
            None => {
                let id = Id::new();
                record.insert("_id", *id);
                id
            }
        };
        coll.records.push(record);
        Ok(id)
    }

    async fn update_by_id(&self, collection: &str, id: Id, patch: Document) -> Result<Document> {
        let changes = set_document(patch)?;
        let mut collections = self.collections.lock().unwrap();
        let coll = collections.entry(collection.to_string()).or_default();
        let record = coll
            .records
            .iter_mut()
            .find(|record| record.get("_id").and_then(Bson::as_object_id) == Some(*id))
            .ok_or_else(|| Error::not_found(format!("Record with ID '{id}'")))?;
        for (key, value) in changes {
            record.insert(key, value);
        }
        Ok(record.clone())
    }

    async fn find_by_id(&self, collection: &str, id: Id) -> Result<Option<Document>> {
        let collections = self.collections.lock().unwrap();
        Ok(collections.get(collection).and_then(|coll| {
            coll.records
                .iter()
                .find(|record| record.get("_id").and_then(Bson::as_object_id) == Some(*id))
                .cloned()
        }))
    }

    async fn find_all(&self, collection: &str, filter: Document) -> Result<Vec<Document>> {
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .map(|coll| {
                coll.records
                    .iter()
                    .filter(|record| matches(record, &filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count_where(&self, collection: &str, filter: Document) -> Result<u64> {
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .map(|coll| {
                coll.records
                    .iter()
                    .filter(|record| matches(record, &filter))
                    .count() as u64
            })
            .unwrap_or(0))
    }
}
