//! Voter records.
//!
//! Name, CNIC, and email are personal data and stored encrypted. The CNIC
//! (the Pakistani national identity card number) is the natural key for a
//! voter within an organizer's roll, but because its ciphertext is
//! non-deterministic it cannot carry a unique index; duplicates are caught
//! by a pre-insert lookup instead.

use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    store::{Id, StoreRecord},
};

pub const CNIC_LEN: usize = 15;

/// A voter ready for submission, before credentials exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVoter {
    pub name: String,
    pub cnic: String,
    pub email: String,
}

impl NewVoter {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Voter name must not be empty"));
        }
        validate_cnic(&self.cnic)?;
        validate_email(&self.email)?;
        Ok(())
    }
}

/// The stored portion of a voter record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterCore {
    pub name: String,
    pub cnic: String,
    pub email: String,
    pub password_hash: String,
    /// The organizer this voter is registered under. All access to the
    /// record is scoped to this organizer.
    pub organizer: Id,
    pub is_active: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl VoterCore {
    pub fn new(new: NewVoter, organizer: Id, password_hash: String) -> Result<Self> {
        new.validate()?;
        Ok(Self {
            name: new.name,
            cnic: new.cnic,
            email: new.email,
            password_hash,
            organizer,
            is_active: true,
            created_at: Utc::now(),
        })
    }
}

/// A voter as retrieved from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub core: VoterCore,
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl DerefMut for Voter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.core
    }
}

impl StoreRecord for VoterCore {
    const COLLECTION: &'static str = "voters";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["name", "cnic", "email"];
}

impl StoreRecord for Voter {
    const COLLECTION: &'static str = VoterCore::COLLECTION;
    const ENCRYPTED_FIELDS: &'static [&'static str] = VoterCore::ENCRYPTED_FIELDS;
}

/// Check the `00000-0000000-0` CNIC format: thirteen digits with dashes
/// after the fifth and twelfth.
pub fn validate_cnic(cnic: &str) -> Result<()> {
    let well_formed = cnic.len() == CNIC_LEN
        && cnic.char_indices().all(|(i, c)| match i {
            5 | 13 => c == '-',
            _ => c.is_ascii_digit(),
        });
    if well_formed {
        Ok(())
    } else {
        Err(Error::validation(
            "CNIC must match the format 00000-0000000-0",
        ))
    }
}

/// Loose structural email check. Deliverability is the mail gateway's
/// problem, not ours.
pub fn validate_email(email: &str) -> Result<()> {
    let well_formed = matches!(
        email.split_once('@'),
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
    );
    if well_formed {
        Ok(())
    } else {
        Err(Error::validation("Invalid email address"))
    }
}

#[cfg(test)]
impl NewVoter {
    pub fn example() -> Self {
        Self {
            name: "Ayesha Khan".to_string(),
            cnic: "35202-1234567-1".to_string(),
            email: "ayesha@example.com".to_string(),
        }
    }
}
