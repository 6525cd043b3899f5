//! Ballot records.
//!
//! The `(poll, voter)` unique index is the final arbiter of
//! one-ballot-per-voter; see [`crate::voting::ballot_box`] for how the
//! pre-insert check and the index cooperate. The request origin fields are
//! personal data and stored encrypted.

use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::store::{Id, StoreRecord};

use super::RequestOrigin;

/// The stored portion of a ballot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteCore {
    pub poll: Id,
    pub voter: Id,
    /// The chosen option's ID within the poll.
    pub option: String,
    #[serde(flatten)]
    pub origin: RequestOrigin,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl VoteCore {
    pub fn new(poll: Id, voter: Id, option: String, origin: RequestOrigin) -> Self {
        Self {
            poll,
            voter,
            option,
            origin,
            timestamp: Utc::now(),
        }
    }
}

/// A ballot as retrieved from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub core: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl DerefMut for Vote {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.core
    }
}

impl StoreRecord for VoteCore {
    const COLLECTION: &'static str = "votes";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["ip_address", "user_agent"];
    const UNIQUE_INDEXES: &'static [&'static [&'static str]] = &[&["poll", "voter"]];
}

impl StoreRecord for Vote {
    const COLLECTION: &'static str = VoteCore::COLLECTION;
    const ENCRYPTED_FIELDS: &'static [&'static str] = VoteCore::ENCRYPTED_FIELDS;
    const UNIQUE_INDEXES: &'static [&'static [&'static str]] = VoteCore::UNIQUE_INDEXES;
}
