//! The encrypted attribute decorator over a [`Repository`].
//!
//! Write paths replace configured attributes with `<iv>:<ciphertext>` tokens
//! before the record reaches the repository; read paths decrypt them back
//! after it returns. Each record's attributes are transformed as a unit
//! around the single storage call, so no reader ever observes a
//! partially-encrypted record.
//!
//! Because every encryption uses a fresh IV, ciphertext equality says nothing
//! about plaintext equality, and no index can serve an equality query over an
//! encrypted attribute. [`EncryptedColl::find_equal`] therefore loads the
//! whole collection and compares after decryption: O(n) with decryption work
//! per record. That is the accepted price of non-deterministic ciphertext and
//! caps these collections at modest sizes.

use std::marker::PhantomData;
use std::sync::Arc;

use log::warn;
use mongodb::bson::{self, doc, Bson, Document};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    crypto::Codec,
    error::{Error, Result},
};

use super::{Id, Repository};

/// A record type bound to a named collection, with its encrypted attributes
/// and unique constraints declared alongside.
pub trait StoreRecord {
    /// The name of the collection.
    const COLLECTION: &'static str;
    /// Attributes stored as ciphertext tokens. Must be string-valued;
    /// absent and null values pass through untouched so optional fields
    /// stay optional.
    const ENCRYPTED_FIELDS: &'static [&'static str] = &[];
    /// Compound unique indexes enforced atomically by the storage engine.
    const UNIQUE_INDEXES: &'static [&'static [&'static str]] = &[];
}

/// Declare the unique indexes of `T` on the backing repository. Idempotent;
/// run at startup before accepting writes.
pub async fn ensure_indexes<T: StoreRecord>(repo: &dyn Repository) -> Result<()> {
    for index in T::UNIQUE_INDEXES {
        repo.ensure_unique_index(T::COLLECTION, index).await?;
    }
    Ok(())
}

/// A typed view of one collection with transparent attribute encryption.
pub struct EncryptedColl<T> {
    repo: Arc<dyn Repository>,
    codec: Codec,
    _record: PhantomData<fn() -> T>,
}

// `derive(Clone)` would demand `T: Clone`, which we don't need.
impl<T> Clone for EncryptedColl<T> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            codec: self.codec,
            _record: PhantomData,
        }
    }
}

impl<T> EncryptedColl<T>
where
    T: StoreRecord + Serialize + DeserializeOwned,
{
    pub fn new(repo: Arc<dyn Repository>, codec: Codec) -> Self {
        Self {
            repo,
            codec,
            _record: PhantomData,
        }
    }

    /// Insert a record, encrypting its configured attributes on the way in.
    pub async fn insert(&self, record: &T) -> Result<Id> {
        let mut document = bson::to_document(record)?;
        self.encrypt_fields(&mut document);
        self.repo.insert(T::COLLECTION, document).await
    }

    /// Apply a partial update, encrypting configured attributes wherever the
    /// patch carries them: at the top level or nested under `$set`. Returns
    /// the updated record, decrypted.
    pub async fn update_by_id(&self, id: Id, mut patch: Document) -> Result<T> {
        self.encrypt_fields(&mut patch);
        if let Ok(set) = patch.get_document_mut("$set") {
            self.encrypt_fields(set);
        }
        let updated = self.repo.update_by_id(T::COLLECTION, id, patch).await?;
        self.decrypt_record(updated)
    }

    /// Fetch a record by ID, decrypting its configured attributes.
    /// A decryption failure on a single-record read propagates.
    pub async fn find_by_id(&self, id: Id) -> Result<Option<T>> {
        match self.repo.find_by_id(T::COLLECTION, id).await? {
            Some(document) => Ok(Some(self.decrypt_record(document)?)),
            None => Ok(None),
        }
    }

    /// All records matching an equality filter over plaintext fields.
    ///
    /// A record that fails to decrypt is logged and skipped: one corrupted
    /// legacy record must not make lookups of every other record fail.
    pub async fn find_all(&self, filter: Document) -> Result<Vec<T>> {
        let documents = self.repo.find_all(T::COLLECTION, filter).await?;
        let mut records = Vec::with_capacity(documents.len());
        for document in documents {
            match self.decrypt_record(document) {
                Ok(record) => records.push(record),
                Err(Error::Decryption) => {
                    warn!("Skipping undecryptable record in '{}'", T::COLLECTION);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(records)
    }

    pub async fn count(&self, filter: Document) -> Result<u64> {
        self.repo.count_where(T::COLLECTION, filter).await
    }

    /// All records whose attribute equals the given plaintext value.
    ///
    /// A plaintext attribute delegates to the repository's native equality
    /// filter. An encrypted attribute forces the full decrypt-and-compare
    /// scan described in the module docs.
    pub async fn find_equal(&self, field: &str, value: &str) -> Result<Vec<T>> {
        if !T::ENCRYPTED_FIELDS.contains(&field) {
            return self.find_all(doc! { field: value }).await;
        }
        let documents = self.repo.find_all(T::COLLECTION, doc! {}).await?;
        let mut matches = Vec::new();
        for document in documents {
            let matched = match document.get(field) {
                Some(Bson::String(stored)) => match self.codec.decrypt(stored) {
                    Ok(plaintext) => plaintext == value,
                    Err(Error::Decryption) => {
                        warn!(
                            "Skipping record with undecryptable '{field}' in '{}'",
                            T::COLLECTION
                        );
                        false
                    }
                    Err(err) => return Err(err),
                },
                _ => false,
            };
            if !matched {
                continue;
            }
            match self.decrypt_record(document) {
                Ok(record) => matches.push(record),
                Err(Error::Decryption) => {
                    warn!("Skipping undecryptable record in '{}'", T::COLLECTION);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(matches)
    }

    /// First record whose attribute equals the given plaintext value.
    pub async fn find_one_equal(&self, field: &str, value: &str) -> Result<Option<T>> {
        Ok(self.find_equal(field, value).await?.into_iter().next())
    }

    /// Replace each configured attribute that is present and string-valued
    /// with its ciphertext token.
    fn encrypt_fields(&self, document: &mut Document) {
        for field in T::ENCRYPTED_FIELDS {
            let token = match document.get(*field) {
                Some(Bson::String(plaintext)) => self.codec.encrypt(plaintext),
                _ => continue,
            };
            document.insert(*field, token);
        }
    }

    /// Decrypt each configured attribute in place, then deserialize.
    fn decrypt_record(&self, mut document: Document) -> Result<T> {
        for field in T::ENCRYPTED_FIELDS {
            let plaintext = match document.get(*field) {
                Some(Bson::String(stored)) => self.codec.decrypt(stored)?.into_owned(),
                _ => continue,
            };
            document.insert(*field, plaintext);
        }
        Ok(bson::from_document(document)?)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use crate::store::MemoryRepository;
    use crate::testing;

    use super::*;

    /// A minimal record with two encrypted attributes and one plaintext one.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Contact {
        name: String,
        email: String,
        city: String,
    }

    impl StoreRecord for Contact {
        const COLLECTION: &'static str = "contacts";
        const ENCRYPTED_FIELDS: &'static [&'static str] = &["name", "email"];
    }

    impl Contact {
        fn new(name: &str, email: &str, city: &str) -> Self {
            Self {
                name: name.to_string(),
                email: email.to_string(),
                city: city.to_string(),
            }
        }
    }

    fn coll_and_repo() -> (EncryptedColl<Contact>, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        let coll = EncryptedColl::new(repo.clone(), testing::codec());
        (coll, repo)
    }

    #[tokio::test]
    async fn attributes_are_ciphertext_at_rest() {
        let (coll, repo) = coll_and_repo();
        let id = coll
            .insert(&Contact::new("Ayesha Khan", "ayesha@example.com", "Lahore"))
            .await
            .unwrap();

        let raw = repo.find_by_id("contacts", id).await.unwrap().unwrap();
        let name = raw.get_str("name").unwrap();
        let email = raw.get_str("email").unwrap();
        assert_ne!(name, "Ayesha Khan");
        assert_ne!(email, "ayesha@example.com");
        assert!(name.contains(':'));
        assert!(email.contains(':'));
        // Plaintext fields are untouched.
        assert_eq!(raw.get_str("city").unwrap(), "Lahore");

        // Reads come back decrypted.
        let read = coll.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(read, Contact::new("Ayesha Khan", "ayesha@example.com", "Lahore"));
    }

    #[tokio::test]
    async fn plaintext_equality_delegates_to_the_repository() {
        let (coll, _repo) = coll_and_repo();
        coll.insert(&Contact::new("Ayesha Khan", "a@example.com", "Lahore"))
            .await
            .unwrap();
        coll.insert(&Contact::new("Bilal Raza", "b@example.com", "Karachi"))
            .await
            .unwrap();
        coll.insert(&Contact::new("Fatima Noor", "f@example.com", "Lahore"))
            .await
            .unwrap();

        let in_lahore = coll.find_equal("city", "Lahore").await.unwrap();
        assert_eq!(in_lahore.len(), 2);
        assert!(in_lahore.iter().all(|c| c.city == "Lahore"));
    }

    #[tokio::test]
    async fn encrypted_equality_scans_and_matches_exactly() {
        let (coll, _repo) = coll_and_repo();
        // Insertion order deliberately scattered around the matches.
        for contact in [
            Contact::new("Bilal Raza", "b@example.com", "Karachi"),
            Contact::new("Ayesha Khan", "shared@example.com", "Lahore"),
            Contact::new("Fatima Noor", "f@example.com", "Multan"),
            Contact::new("Hassan Ali", "shared@example.com", "Quetta"),
            Contact::new("Zainab Tariq", "z@example.com", "Lahore"),
        ] {
            coll.insert(&contact).await.unwrap();
        }

        let sharing = coll.find_equal("email", "shared@example.com").await.unwrap();
        assert_eq!(sharing.len(), 2);
        assert!(sharing.iter().all(|c| c.email == "shared@example.com"));

        let first = coll
            .find_one_equal("name", "Fatima Noor")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.city, "Multan");

        assert!(coll
            .find_one_equal("name", "Nobody Here")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn legacy_plaintext_records_remain_readable() {
        let (coll, repo) = coll_and_repo();
        // A record written before encryption was introduced.
        let id = repo
            .insert(
                "contacts",
                doc! { "name": "Old Record", "email": "old@example.com", "city": "Lahore" },
            )
            .await
            .unwrap();

        let read = coll.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(read.name, "Old Record");

        let matched = coll
            .find_one_equal("email", "old@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matched.name, "Old Record");
    }

    #[tokio::test]
    async fn corrupted_records_are_skipped_in_scans_but_fail_direct_reads() {
        let (coll, repo) = coll_and_repo();
        coll.insert(&Contact::new("Ayesha Khan", "ayesha@example.com", "Lahore"))
            .await
            .unwrap();
        // Token-shaped but undecryptable: valid hex, not a whole block.
        let corrupt_token = format!("{}:abcd", "0".repeat(32));
        let corrupt_id = repo
            .insert(
                "contacts",
                doc! { "name": corrupt_token.clone(), "email": corrupt_token, "city": "Lahore" },
            )
            .await
            .unwrap();

        // The scan still finds the healthy record.
        let found = coll
            .find_one_equal("email", "ayesha@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "Ayesha Khan");

        // Batch reads skip the corrupted record rather than failing.
        let all = coll.find_all(doc! {}).await.unwrap();
        assert_eq!(all.len(), 1);

        // A direct read of the corrupted record surfaces the error.
        assert!(matches!(
            coll.find_by_id(corrupt_id).await,
            Err(Error::Decryption)
        ));
    }

    #[tokio::test]
    async fn updates_encrypt_patched_attributes() {
        let (coll, repo) = coll_and_repo();
        let id = coll
            .insert(&Contact::new("Ayesha Khan", "ayesha@example.com", "Lahore"))
            .await
            .unwrap();

        // Patch under $set.
        let updated = coll
            .update_by_id(id, doc! { "$set": { "email": "new@example.com" } })
            .await
            .unwrap();
        assert_eq!(updated.email, "new@example.com");
        let raw = repo.find_by_id("contacts", id).await.unwrap().unwrap();
        assert_ne!(raw.get_str("email").unwrap(), "new@example.com");

        // Bare patch; plaintext field stays plaintext.
        let updated = coll
            .update_by_id(id, doc! { "name": "Ayesha Iqbal", "city": "Karachi" })
            .await
            .unwrap();
        assert_eq!(updated.name, "Ayesha Iqbal");
        assert_eq!(updated.city, "Karachi");
        let raw = repo.find_by_id("contacts", id).await.unwrap().unwrap();
        assert_ne!(raw.get_str("name").unwrap(), "Ayesha Iqbal");
        assert_eq!(raw.get_str("city").unwrap(), "Karachi");
    }

    #[tokio::test]
    async fn two_encryptions_of_one_value_differ_at_rest() {
        let (coll, repo) = coll_and_repo();
        let a = coll
            .insert(&Contact::new("Same Person", "same@example.com", "Lahore"))
            .await
            .unwrap();
        let b = coll
            .insert(&Contact::new("Same Person", "same@example.com", "Lahore"))
            .await
            .unwrap();

        let raw_a = repo.find_by_id("contacts", a).await.unwrap().unwrap();
        let raw_b = repo.find_by_id("contacts", b).await.unwrap().unwrap();
        // No equality signal leaks through the stored bytes.
        assert_ne!(raw_a.get_str("email").unwrap(), raw_b.get_str("email").unwrap());

        // Yet the scan sees both.
        let both = coll.find_equal("email", "same@example.com").await.unwrap();
        assert_eq!(both.len(), 2);
    }
}
