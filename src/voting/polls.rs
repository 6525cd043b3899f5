//! Poll lifecycle management.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Document};
use serde::Deserialize;

use crate::{
    audit::{Actor, AuditAction, AuditEvent, AuditSink, Resource, ResourceKind},
    crypto::Codec,
    error::{Error, Result},
    model::{poll, Organizer, Poll, PollCore, PollSpec, PollStatus, RequestOrigin, Vote, Voter},
    store::{EncryptedColl, Id, Repository},
};

/// Partial update to a poll. Only allowed while no ballots exist.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Replaces the whole option list; fresh option IDs are assigned.
    pub options: Option<Vec<String>>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Creates, mutates, and tallies an organizer's polls.
pub struct PollService {
    polls: EncryptedColl<Poll>,
    new_polls: EncryptedColl<PollCore>,
    votes: EncryptedColl<Vote>,
    audit: Arc<dyn AuditSink>,
}

impl PollService {
    pub fn new(repo: Arc<dyn Repository>, codec: Codec, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            polls: EncryptedColl::new(Arc::clone(&repo), codec),
            new_polls: EncryptedColl::new(Arc::clone(&repo), codec),
            votes: EncryptedColl::new(repo, codec),
            audit,
        }
    }

    pub async fn create(
        &self,
        organizer: &Organizer,
        spec: PollSpec,
        origin: RequestOrigin,
    ) -> Result<Poll> {
        let core = PollCore::new(spec, organizer.id)?;
        let id = self.new_polls.insert(&core).await?;
        self.audit
            .record(AuditEvent::new(
                AuditAction::PollCreated,
                Actor::organizer(organizer.id, organizer.name.clone()),
                Resource::new(ResourceKind::Poll, id),
                format!("Poll \"{}\" created", core.title),
                origin,
            ))
            .await;
        Ok(Poll { id, core })
    }

    /// Fetch a poll, enforcing ownership. Soft-deleted polls read as absent.
    pub async fn get(&self, organizer: &Organizer, id: Id) -> Result<Poll> {
        let poll = self
            .polls
            .find_by_id(id)
            .await?
            .filter(|poll| !poll.is_deleted)
            .ok_or_else(|| Error::not_found(format!("Poll with ID '{id}'")))?;
        if poll.organizer != organizer.id {
            return Err(Error::unauthorized("Not authorized to access this poll"));
        }
        Ok(poll)
    }

    pub async fn list(&self, organizer: &Organizer) -> Result<Vec<Poll>> {
        self.polls
            .find_all(doc! { "organizer": organizer.id, "is_deleted": false })
            .await
    }

    /// Polls the voter can cast a ballot in right now: their organizer's
    /// active polls whose deadline has not passed, minus the ones they have
    /// already voted in. Newest first.
    pub async fn available_for(&self, voter: &Voter) -> Result<Vec<Poll>> {
        let mut polls = self
            .polls
            .find_all(doc! {
                "organizer": voter.organizer,
                "status": PollStatus::Active,
                "is_deleted": false,
            })
            .await?;

        let voted: HashSet<Id> = self
            .votes
            .find_all(doc! { "voter": voter.id })
            .await?
            .into_iter()
            .map(|vote| vote.poll)
            .collect();

        let now = Utc::now();
        polls.retain(|poll| poll.deadline > now && !voted.contains(&poll.id));
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(polls)
    }

    /// Edit a poll. Refused once any ballot exists: changing the question
    /// or the options under cast votes would change what those votes meant.
    pub async fn update(
        &self,
        organizer: &Organizer,
        id: Id,
        update: PollUpdate,
        origin: RequestOrigin,
    ) -> Result<Poll> {
        self.get(organizer, id).await?;
        if self.votes.count(doc! { "poll": id }).await? > 0 {
            return Err(Error::conflict(
                "Poll cannot be modified once votes have been cast",
            ));
        }

        let mut patch = Document::new();
        if let Some(title) = update.title {
            poll::validate_title(&title)?;
            patch.insert("title", title);
        }
        if let Some(description) = update.description {
            poll::validate_description(&description)?;
            patch.insert("description", description);
        }
        if let Some(texts) = update.options {
            let options = poll::validate_options(texts)?;
            patch.insert("options", mongodb::bson::to_bson(&options)?);
        }
        if let Some(deadline) = update.deadline {
            poll::validate_deadline(deadline)?;
            patch.insert("deadline", mongodb::bson::DateTime::from_chrono(deadline));
        }
        if patch.is_empty() {
            return Err(Error::validation("Nothing to update"));
        }

        let poll = self.polls.update_by_id(id, patch).await?;
        self.audit
            .record(AuditEvent::new(
                AuditAction::PollUpdated,
                Actor::organizer(organizer.id, organizer.name.clone()),
                Resource::new(ResourceKind::Poll, id),
                format!("Poll \"{}\" updated", poll.title),
                origin,
            ))
            .await;
        Ok(poll)
    }

    /// Open a draft poll for voting.
    pub async fn activate(
        &self,
        organizer: &Organizer,
        id: Id,
        origin: RequestOrigin,
    ) -> Result<Poll> {
        self.transition(organizer, id, PollStatus::Draft, PollStatus::Active, origin)
            .await
    }

    /// Close an active poll. Closing is final.
    pub async fn close(
        &self,
        organizer: &Organizer,
        id: Id,
        origin: RequestOrigin,
    ) -> Result<Poll> {
        self.transition(organizer, id, PollStatus::Active, PollStatus::Closed, origin)
            .await
    }

    async fn transition(
        &self,
        organizer: &Organizer,
        id: Id,
        from: PollStatus,
        to: PollStatus,
        origin: RequestOrigin,
    ) -> Result<Poll> {
        let poll = self.get(organizer, id).await?;
        if poll.status != from {
            return Err(Error::validation(format!(
                "Poll cannot move from {:?} to {to:?}",
                poll.status
            )));
        }
        let poll = self.polls.update_by_id(id, doc! { "status": to }).await?;
        self.audit
            .record(AuditEvent::new(
                AuditAction::PollUpdated,
                Actor::organizer(organizer.id, organizer.name.clone()),
                Resource::new(ResourceKind::Poll, id),
                format!("Poll \"{}\" moved to {to:?}", poll.title),
                origin,
            ))
            .await;
        Ok(poll)
    }

    /// Soft-delete a poll. Ballots stay in the store for the audit trail,
    /// but the poll disappears from every read path.
    pub async fn soft_delete(
        &self,
        organizer: &Organizer,
        id: Id,
        origin: RequestOrigin,
    ) -> Result<()> {
        let poll = self.get(organizer, id).await?;
        self.polls
            .update_by_id(id, doc! { "is_deleted": true })
            .await?;
        self.audit
            .record(AuditEvent::new(
                AuditAction::PollDeleted,
                Actor::organizer(organizer.id, organizer.name.clone()),
                Resource::new(ResourceKind::Poll, id),
                format!("Poll \"{}\" deleted", poll.title),
                origin,
            ))
            .await;
        Ok(())
    }

    /// Tally a poll's ballots.
    pub async fn results(&self, organizer: &Organizer, id: Id) -> Result<super::PollResults> {
        let poll = self.get(organizer, id).await?;
        super::PollResults::compute(&poll, &self.votes).await
    }
}
