//! MongoDB-backed repository.

use async_trait::async_trait;
use futures::TryStreamExt;
use log::debug;
use mongodb::{
    bson::{doc, Document},
    error::{Error as DbError, ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument},
    Collection, Database, IndexModel,
};

use crate::error::{Error, Result};

use super::{Id, Repository};

/// MongoDB error code for a unique index violation. The driver does not
/// export error code constants.
const DUPLICATE_KEY: i32 = 11000;

/// Return true if the given error is a duplicate key write error.
fn is_duplicate_key_error(err: &DbError) -> bool {
    if let ErrorKind::Write(WriteFailure::WriteError(ref e)) = *err.kind {
        return e.code == DUPLICATE_KEY;
    }
    false
}

/// A [`Repository`] backed by a MongoDB database.
pub struct MongoRepository {
    db: Database,
}

impl MongoRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn coll(&self, collection: &str) -> Collection<Document> {
        self.db.collection(collection)
    }
}

#[async_trait]
impl Repository for MongoRepository {
    async fn ensure_unique_index(&self, collection: &str, fields: &[&str]) -> Result<()> {
        debug!("Ensuring unique index on '{collection}' over {fields:?}");
        let mut keys = Document::new();
        for field in fields {
            keys.insert(*field, 1);
        }
        let options = IndexOptions::builder().unique(true).build();
        let index = IndexModel::builder().keys(keys).options(options).build();
        self.coll(collection).create_index(index, None).await?;
        Ok(())
    }

    async fn insert(&self, collection: &str, record: Document) -> Result<Id> {
        match self.coll(collection).insert_one(record, None).await {
            Ok(outcome) => outcome.inserted_id.as_object_id().map(Id::from).ok_or_else(|| {
                Error::Unavailable("insert did not return an object ID".to_string())
            }),
            Err(err) if is_duplicate_key_error(&err) => {
                Err(Error::conflict("record violates a uniqueness constraint"))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update_by_id(&self, collection: &str, id: Id, patch: Document) -> Result<Document> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        self.coll(collection)
            .find_one_and_update(id.as_doc(), as_update(patch), options)
            .await?
            .ok_or_else(|| Error::not_found(format!("Record with ID '{id}'")))
    }

    async fn find_by_id(&self, collection: &str, id: Id) -> Result<Option<Document>> {
        Ok(self.coll(collection).find_one(id.as_doc(), None).await?)
    }

    async fn find_all(&self, collection: &str, filter: Document) -> Result<Vec<Document>> {
        let cursor = self.coll(collection).find(filter, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_where(&self, collection: &str, filter: Document) -> Result<u64> {
        Ok(self.coll(collection).count_documents(filter, None).await?)
    }
}

/// Wrap a bare partial document in `$set`; pass operator documents through.
fn as_update(patch: Document) -> Document {
    if patch.keys().any(|key| key.starts_with('$')) {
        patch
    } else {
        doc! { "$set": patch }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_patches_are_wrapped_in_set() {
        let wrapped = as_update(doc! { "is_active": false });
        assert_eq!(wrapped, doc! { "$set": { "is_active": false } });

        let passthrough = as_update(doc! { "$set": { "is_active": false } });
        assert_eq!(passthrough, doc! { "$set": { "is_active": false } });
    }
}
