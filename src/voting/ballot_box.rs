//! Ballot casting.
//!
//! One ballot per voter per poll is enforced twice. The pre-insert check
//! catches the ordinary double submission with a friendly error before any
//! write happens. Two requests racing past that check are then decided by
//! the `(poll, voter)` unique index: exactly one insert commits and the
//! loser's conflict is reported with the same message. No duplicate can be
//! stored either way.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};

use crate::{
    audit::{Actor, AuditAction, AuditEvent, AuditSink, Resource, ResourceKind},
    crypto::Codec,
    error::{Error, Result},
    model::{Poll, PollStatus, RequestOrigin, Vote, VoteCore, Voter},
    store::{EncryptedColl, Id, Repository},
};

const ALREADY_VOTED: &str = "You have already voted in this poll";

/// A ballot as submitted by a voter.
#[derive(Debug, Clone, Deserialize)]
pub struct VoteRequest {
    /// The chosen option's ID.
    pub option: String,
    #[serde(flatten)]
    pub origin: RequestOrigin,
}

/// Whether (and how) a voter has voted in a poll.
#[derive(Debug, Clone, Serialize)]
pub struct VoteStatus {
    pub has_voted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Accepts ballots, enforcing poll state and one ballot per voter.
pub struct BallotBox {
    votes: EncryptedColl<Vote>,
    new_votes: EncryptedColl<VoteCore>,
    audit: Arc<dyn AuditSink>,
}

impl BallotBox {
    pub fn new(repo: Arc<dyn Repository>, codec: Codec, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            votes: EncryptedColl::new(Arc::clone(&repo), codec),
            new_votes: EncryptedColl::new(repo, codec),
            audit,
        }
    }

    /// Cast a ballot. Every eligibility rule is checked here, in order of
    /// how much each check reveals: poll existence first, voter standing,
    /// then the ballot itself.
    pub async fn cast(&self, poll: &Poll, voter: &Voter, request: VoteRequest) -> Result<Id> {
        if poll.is_deleted {
            return Err(Error::not_found(format!("Poll with ID '{}'", poll.id)));
        }
        if poll.status != PollStatus::Active {
            return Err(Error::validation("This poll is not active"));
        }
        // The deadline is re-evaluated on every ballot; a poll can pass its
        // deadline without any state transition having run.
        if Utc::now() >= poll.deadline {
            return Err(Error::validation("Voting deadline has passed"));
        }
        if !voter.is_active {
            return Err(Error::unauthorized("This voter account is deactivated"));
        }
        if voter.organizer != poll.organizer {
            return Err(Error::unauthorized("Not authorized to vote in this poll"));
        }
        let option = poll
            .option(&request.option)
            .ok_or_else(|| Error::validation("Invalid option selected"))?;

        if self.has_voted(poll.id, voter.id).await? {
            return Err(Error::conflict(ALREADY_VOTED));
        }

        let ballot = VoteCore::new(poll.id, voter.id, option.id.clone(), request.origin.clone());
        let id = match self.new_votes.insert(&ballot).await {
            Ok(id) => id,
            // Lost the race against a concurrent ballot from the same voter.
            Err(Error::Conflict(_)) => return Err(Error::conflict(ALREADY_VOTED)),
            Err(err) => return Err(err),
        };

        self.audit
            .record(AuditEvent::new(
                AuditAction::VoteCast,
                Actor::voter(voter.id, voter.name.clone()),
                Resource::new(ResourceKind::Vote, id),
                format!("Vote cast in poll \"{}\"", poll.title),
                request.origin,
            ))
            .await;
        Ok(id)
    }

    /// Whether the voter has already cast a ballot in the poll.
    pub async fn has_voted(&self, poll: Id, voter: Id) -> Result<bool> {
        Ok(self
            .votes
            .count(doc! { "poll": poll, "voter": voter })
            .await?
            > 0)
    }

    /// How the voter stands in the poll: whether they voted, and if so for
    /// what and when.
    pub async fn vote_status(&self, poll: &Poll, voter: &Voter) -> Result<VoteStatus> {
        if voter.organizer != poll.organizer {
            return Err(Error::unauthorized("Not authorized to vote in this poll"));
        }
        let ballot = self
            .votes
            .find_all(doc! { "poll": poll.id, "voter": voter.id })
            .await?
            .into_iter()
            .next();
        Ok(match ballot {
            Some(ballot) => VoteStatus {
                has_voted: true,
                option: Some(ballot.option.clone()),
                timestamp: Some(ballot.timestamp),
            },
            None => VoteStatus {
                has_voted: false,
                option: None,
                timestamp: None,
            },
        })
    }
}
