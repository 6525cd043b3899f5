use async_trait::async_trait;
use mongodb::bson::Document;

use crate::error::Result;

use super::Id;

/// The contract the core consumes from the underlying storage engine.
///
/// Filters passed to [`find_all`](Repository::find_all) and
/// [`count_where`](Repository::count_where) are equality predicates over
/// plaintext fields only; equality over encrypted attributes goes through
/// [`EncryptedColl::find_equal`](super::EncryptedColl::find_equal) instead.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Declare a compound unique index, enforced atomically at insert time.
    /// Idempotent.
    async fn ensure_unique_index(&self, collection: &str, fields: &[&str]) -> Result<()>;

    /// Insert a record, returning its new ID. A unique-index violation
    /// surfaces as [`Error::Conflict`](crate::Error::Conflict); callers that
    /// race on a constraint treat it as a signal, not a failure.
    async fn insert(&self, collection: &str, record: Document) -> Result<Id>;

    /// Apply a partial update to the record with the given ID and return the
    /// updated record. The patch may be a bare partial document or already
    /// wrapped in `$set`.
    async fn update_by_id(&self, collection: &str, id: Id, patch: Document) -> Result<Document>;

    async fn find_by_id(&self, collection: &str, id: Id) -> Result<Option<Document>>;

    /// All records matching an equality filter over plaintext fields.
    async fn find_all(&self, collection: &str, filter: Document) -> Result<Vec<Document>>;

    async fn count_where(&self, collection: &str, filter: Document) -> Result<u64>;
}
