//! Result tallies.
//!
//! Tallies are recomputed from the ballots on every call rather than kept as
//! counters, so a tally can never drift from the ballots that back it.

use std::collections::HashMap;

use log::warn;
use mongodb::bson::doc;
use serde::Serialize;

use crate::{
    error::Result,
    model::{Poll, Vote},
    store::{EncryptedColl, Id},
};

/// The tally for one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionTally {
    pub option_id: String,
    pub option: String,
    pub votes: u64,
}

/// A complete tally of one poll.
#[derive(Debug, Clone, Serialize)]
pub struct PollResults {
    pub poll_id: Id,
    pub title: String,
    pub total_votes: u64,
    /// One entry per poll option, in the poll's own order. Options with no
    /// ballots appear with a zero count.
    pub options: Vec<OptionTally>,
}

impl PollResults {
    /// Tally every ballot of the poll.
    pub async fn compute(poll: &Poll, votes: &EncryptedColl<Vote>) -> Result<Self> {
        let ballots = votes.find_all(doc! { "poll": poll.id }).await?;

        let mut counts: HashMap<&str, u64> = HashMap::new();
        for ballot in &ballots {
            *counts.entry(ballot.option.as_str()).or_insert(0) += 1;
        }

        let options: Vec<OptionTally> = poll
            .options
            .iter()
            .map(|option| OptionTally {
                option_id: option.id.clone(),
                option: option.text.clone(),
                votes: counts.get(option.id.as_str()).copied().unwrap_or(0),
            })
            .collect();
        let total_votes = options.iter().map(|tally| tally.votes).sum();

        // A ballot referencing no current option would break conservation.
        let stored = ballots.len() as u64;
        if stored != total_votes {
            warn!(
                "Poll '{}' tally mismatch: {stored} ballots stored, {total_votes} attributed",
                poll.id
            );
        }

        Ok(Self {
            poll_id: poll.id,
            title: poll.title.clone(),
            total_votes,
            options,
        })
    }
}
