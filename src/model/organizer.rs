//! Organizer accounts. Each organizer owns a disjoint set of voters and
//! polls; the email address is the login identifier.

use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    store::{Id, StoreRecord},
};

use super::voter::validate_email;

pub const MIN_PASSWORD_LEN: usize = 8;

/// A signup request, before the password is hashed.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrganizer {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl NewOrganizer {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Organizer name must not be empty"));
        }
        validate_email(&self.email)?;
        if self.password.len() < MIN_PASSWORD_LEN {
            return Err(Error::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizerCore {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl OrganizerCore {
    pub fn new(name: String, email: String, password_hash: String) -> Self {
        Self {
            name,
            email,
            password_hash,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organizer {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub core: OrganizerCore,
}

impl Organizer {
    /// Check a login attempt against the stored hash.
    pub fn verify_password(&self, password: &str) -> bool {
        crate::identity::password::verify(&self.password_hash, password)
    }
}

impl Deref for Organizer {
    type Target = OrganizerCore;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl DerefMut for Organizer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.core
    }
}

impl StoreRecord for OrganizerCore {
    const COLLECTION: &'static str = "organizers";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["name", "email"];
}

impl StoreRecord for Organizer {
    const COLLECTION: &'static str = OrganizerCore::COLLECTION;
    const ENCRYPTED_FIELDS: &'static [&'static str] = OrganizerCore::ENCRYPTED_FIELDS;
}

#[cfg(test)]
impl NewOrganizer {
    pub fn example() -> Self {
        Self {
            name: "Imran Siddiqui".to_string(),
            email: "imran@polls.example.com".to_string(),
            password: "correct horse battery staple".to_string(),
        }
    }
}
