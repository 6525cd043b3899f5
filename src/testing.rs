//! Shared fixtures for the test suite. Everything runs against the
//! in-memory backend with recording stand-ins for the audit and
//! notification sinks.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    audit::{AuditEvent, AuditSink},
    crypto::Codec,
    error::{Error, Result},
    identity::{OrganizerRegistry, VoterRegistry},
    model::{NewOrganizer, NewVoter, Organizer, RequestOrigin, Vote, VoteCore, Voter},
    notify::{CredentialDelivery, NotificationSink},
    store::{EncryptedColl, MemoryRepository, Repository, StoreRecord},
    voting::{BallotBox, PollService},
};

pub fn codec() -> Codec {
    Codec::example()
}

pub fn origin() -> RequestOrigin {
    RequestOrigin::example()
}

/// Captures audit events for assertions.
#[derive(Default)]
pub struct RecordingAuditSink {
    pub events: Mutex<Vec<AuditEvent>>,
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Captures credential deliveries, or refuses them all.
#[derive(Default)]
pub struct StubNotifier {
    fail: bool,
    pub deliveries: Mutex<Vec<CredentialDelivery>>,
}

impl StubNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            deliveries: Mutex::default(),
        }
    }
}

#[async_trait]
impl NotificationSink for StubNotifier {
    async fn deliver(&self, delivery: CredentialDelivery) -> Result<()> {
        if self.fail {
            return Err(Error::Unavailable("email gateway offline".to_string()));
        }
        self.deliveries.lock().unwrap().push(delivery);
        Ok(())
    }
}

/// The whole core wired up against one in-memory store.
pub struct Harness {
    pub repo: Arc<MemoryRepository>,
    pub audit: Arc<RecordingAuditSink>,
    pub notifier: Arc<StubNotifier>,
    pub organizers: OrganizerRegistry,
    pub voters: VoterRegistry,
    pub polls: PollService,
    pub ballots: BallotBox,
    pub votes: EncryptedColl<Vote>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(StubNotifier::default())
    }

    pub fn with_failing_notifier() -> Self {
        Self::build(StubNotifier::failing())
    }

    fn build(notifier: StubNotifier) -> Self {
        let repo = Arc::new(MemoryRepository::new());
        for index in VoteCore::UNIQUE_INDEXES {
            repo.declare_unique_index(VoteCore::COLLECTION, index);
        }
        let audit = Arc::new(RecordingAuditSink::default());
        let notifier = Arc::new(notifier);

        let store: Arc<dyn Repository> = repo.clone();
        let sink: Arc<dyn AuditSink> = audit.clone();
        Self {
            organizers: OrganizerRegistry::new(Arc::clone(&store), codec(), Arc::clone(&sink)),
            voters: VoterRegistry::new(
                Arc::clone(&store),
                codec(),
                Arc::clone(&sink),
                notifier.clone(),
            ),
            polls: PollService::new(Arc::clone(&store), codec(), Arc::clone(&sink)),
            ballots: BallotBox::new(Arc::clone(&store), codec(), sink),
            votes: EncryptedColl::new(store, codec()),
            repo,
            audit,
            notifier,
        }
    }

    pub async fn organizer(&self) -> Organizer {
        self.organizers
            .sign_up(NewOrganizer::example(), RequestOrigin::default())
            .await
            .unwrap()
    }

    pub async fn other_organizer(&self) -> Organizer {
        let mut signup = NewOrganizer::example();
        signup.name = "Sana Malik".to_string();
        signup.email = "sana@polls.example.com".to_string();
        self.organizers
            .sign_up(signup, RequestOrigin::default())
            .await
            .unwrap()
    }

    /// Register `count` voters on the organizer's roll.
    pub async fn roll(&self, organizer: &Organizer, count: usize) -> Vec<Voter> {
        let mut voters = Vec::with_capacity(count);
        for n in 0..count {
            let new = NewVoter {
                name: format!("Voter {n}"),
                cnic: format!("35202-12345{n:02}-1"),
                email: format!("voter{n}@example.com"),
            };
            let outcome = self
                .voters
                .register(organizer, new, RequestOrigin::default())
                .await
                .unwrap();
            voters.push(self.voters.get(organizer, outcome.id).await.unwrap());
        }
        voters
    }
}
