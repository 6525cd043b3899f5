//! Audit trail of state-changing operations.
//!
//! Recording is fire-and-forget: the operations being audited have already
//! committed, so a sink failure is logged and swallowed rather than turned
//! into a user-facing error.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use mongodb::bson::{self, serde_helpers::chrono_datetime_as_bson_datetime};
use serde::{Deserialize, Serialize};

use crate::{
    model::RequestOrigin,
    store::{Id, Repository},
};

pub const AUDIT_COLLECTION: &str = "audit_logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    OrganizerSignup,
    VoterCreated,
    VoterUpdated,
    VoterDeactivated,
    VoterCredentialsReset,
    PollCreated,
    PollUpdated,
    PollDeleted,
    VoteCast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Organizer,
    Voter,
    System,
}

/// Who performed the operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub role: ActorRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub name: String,
}

impl Actor {
    pub fn organizer(id: Id, name: impl Into<String>) -> Self {
        Self {
            role: ActorRole::Organizer,
            id: Some(id),
            name: name.into(),
        }
    }

    pub fn voter(id: Id, name: impl Into<String>) -> Self {
        Self {
            role: ActorRole::Voter,
            id: Some(id),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Organizer,
    Voter,
    Poll,
    Vote,
}

/// What the operation acted on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub id: Id,
}

impl Resource {
    pub fn new(kind: ResourceKind, id: Id) -> Self {
        Self { kind, id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub actor: Actor,
    pub resource: Resource,
    pub detail: String,
    #[serde(flatten)]
    pub origin: RequestOrigin,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        action: AuditAction,
        actor: Actor,
        resource: Resource,
        detail: impl Into<String>,
        origin: RequestOrigin,
    ) -> Self {
        Self {
            action,
            actor,
            resource,
            detail: detail.into(),
            origin,
            timestamp: Utc::now(),
        }
    }
}

/// Destination for audit events. Implementations must not fail the caller.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Persists audit events to the backing store, unencrypted; the trail is
/// operator-facing and holds no voter secrets beyond what `detail` carries.
pub struct StoreAuditSink {
    repo: Arc<dyn Repository>,
}

impl StoreAuditSink {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl AuditSink for StoreAuditSink {
    async fn record(&self, event: AuditEvent) {
        let document = match bson::to_document(&event) {
            Ok(document) => document,
            Err(err) => {
                warn!("Dropping unserializable audit event: {err}");
                return;
            }
        };
        if let Err(err) = self.repo.insert(AUDIT_COLLECTION, document).await {
            warn!("Failed to persist audit event: {err}");
        }
    }
}

/// Writes audit events to the application log instead of the store.
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            "{:?} by {} ({:?}) on {:?} {}: {}",
            event.action, event.actor.name, event.actor.role, event.resource.kind,
            event.resource.id, event.detail
        );
    }
}
