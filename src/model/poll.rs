//! Polls: a question, a fixed option list, a lifecycle, and a deadline.
//!
//! The lifecycle is one-way: `Draft -> Active -> Closed`. The deadline is
//! not a state transition; an active poll past its deadline simply stops
//! accepting ballots until someone closes it.

use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, serde_helpers::chrono_datetime_as_bson_datetime, Bson};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    store::{Id, StoreRecord},
};

pub const MIN_TITLE_LEN: usize = 5;
pub const MAX_TITLE_LEN: usize = 100;
pub const MIN_DESCRIPTION_LEN: usize = 10;
pub const MIN_OPTIONS: usize = 2;

/// Lifecycle state of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Draft,
    Active,
    Closed,
}

impl From<PollStatus> for Bson {
    fn from(status: PollStatus) -> Self {
        let name = match status {
            PollStatus::Draft => "draft",
            PollStatus::Active => "active",
            PollStatus::Closed => "closed",
        };
        Bson::String(name.to_string())
    }
}

/// One choice on a poll's ballot. The ID is assigned at creation and is
/// what votes reference; option text can be corrected without orphaning
/// existing ballots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub text: String,
}

impl PollOption {
    fn new(text: String) -> Self {
        Self {
            id: ObjectId::new().to_hex(),
            text,
        }
    }
}

/// A poll as submitted for creation.
#[derive(Debug, Clone, Deserialize)]
pub struct PollSpec {
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    #[serde(default = "PollSpec::default_status")]
    pub status: PollStatus,
    pub deadline: DateTime<Utc>,
}

impl PollSpec {
    fn default_status() -> PollStatus {
        PollStatus::Active
    }
}

/// The stored portion of a poll record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollCore {
    pub title: String,
    pub description: String,
    pub options: Vec<PollOption>,
    pub organizer: Id,
    pub status: PollStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub deadline: DateTime<Utc>,
    pub is_deleted: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl PollCore {
    pub fn new(spec: PollSpec, organizer: Id) -> Result<Self> {
        validate_title(&spec.title)?;
        validate_description(&spec.description)?;
        let options = validate_options(spec.options)?;
        validate_deadline(spec.deadline)?;
        Ok(Self {
            title: spec.title,
            description: spec.description,
            options,
            organizer,
            status: spec.status,
            deadline: spec.deadline,
            is_deleted: false,
            created_at: Utc::now(),
        })
    }

    /// Look up an option by its ID.
    pub fn option(&self, id: &str) -> Option<&PollOption> {
        self.options.iter().find(|option| option.id == id)
    }
}

/// A poll as retrieved from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub core: PollCore,
}

impl Deref for Poll {
    type Target = PollCore;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl DerefMut for Poll {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.core
    }
}

impl StoreRecord for PollCore {
    const COLLECTION: &'static str = "polls";
}

impl StoreRecord for Poll {
    const COLLECTION: &'static str = PollCore::COLLECTION;
}

pub fn validate_title(title: &str) -> Result<()> {
    let len = title.trim().chars().count();
    if (MIN_TITLE_LEN..=MAX_TITLE_LEN).contains(&len) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "Poll title must be between {MIN_TITLE_LEN} and {MAX_TITLE_LEN} characters"
        )))
    }
}

pub fn validate_description(description: &str) -> Result<()> {
    if description.trim().chars().count() >= MIN_DESCRIPTION_LEN {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "Poll description must be at least {MIN_DESCRIPTION_LEN} characters"
        )))
    }
}

pub fn validate_deadline(deadline: DateTime<Utc>) -> Result<()> {
    if deadline > Utc::now() {
        Ok(())
    } else {
        Err(Error::validation("Deadline must be in the future"))
    }
}

/// Check the submitted option texts and assign each one an ID.
pub fn validate_options(texts: Vec<String>) -> Result<Vec<PollOption>> {
    if texts.len() < MIN_OPTIONS {
        return Err(Error::validation(format!(
            "A poll needs at least {MIN_OPTIONS} options"
        )));
    }
    if texts.iter().any(|text| text.trim().is_empty()) {
        return Err(Error::validation("Poll options must not be empty"));
    }
    Ok(texts.into_iter().map(PollOption::new).collect())
}

#[cfg(test)]
impl PollSpec {
    pub fn example() -> Self {
        Self {
            title: "Student council president".to_string(),
            description: "Choose the student council president for this year.".to_string(),
            options: vec![
                "Ayesha Khan".to_string(),
                "Bilal Raza".to_string(),
                "Fatima Noor".to_string(),
            ],
            status: PollStatus::Active,
            deadline: Utc::now() + chrono::Duration::days(7),
        }
    }
}

#[cfg(test)]
impl Poll {
    pub fn example(organizer: Id) -> Self {
        Self {
            id: Id::new(),
            core: PollCore::new(PollSpec::example(), organizer).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_spec_builds_a_poll() {
        let poll = PollCore::new(PollSpec::example(), Id::new()).unwrap();
        assert_eq!(poll.status, PollStatus::Active);
        assert!(!poll.is_deleted);
        assert_eq!(poll.options.len(), 3);
        // Every option got a distinct ID.
        assert_ne!(poll.options[0].id, poll.options[1].id);
        let first = poll.options[0].clone();
        assert_eq!(poll.option(&first.id), Some(&first));
        assert_eq!(poll.option("missing"), None);
    }

    #[test]
    fn creation_validation() {
        let cases: Vec<(&str, Box<dyn Fn(&mut PollSpec)>)> = vec![
            ("short title", Box::new(|s| s.title = "Hm".to_string())),
            ("long title", Box::new(|s| s.title = "x".repeat(101))),
            ("short description", Box::new(|s| s.description = "tiny".to_string())),
            ("one option", Box::new(|s| s.options.truncate(1))),
            ("blank option", Box::new(|s| s.options[1] = "  ".to_string())),
            (
                "past deadline",
                Box::new(|s| s.deadline = Utc::now() - chrono::Duration::hours(1)),
            ),
        ];
        for (label, mutate) in cases {
            let mut spec = PollSpec::example();
            mutate(&mut spec);
            assert!(PollCore::new(spec, Id::new()).is_err(), "accepted {label}");
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(Bson::from(PollStatus::Active), Bson::String("active".to_string()));
        assert_eq!(Bson::from(PollStatus::Closed), Bson::String("closed".to_string()));
    }
}
