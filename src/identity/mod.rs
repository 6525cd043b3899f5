//! Account management for organizers and the voters they register.
//!
//! Voters never choose their own password: registration generates one,
//! stores only its hash, and hands the plaintext to the notification sink
//! exactly once. If delivery fails the account still exists; the outcome
//! reports the failure so the organizer can reset credentials and retry.

pub mod password;

use std::sync::Arc;

use log::warn;
use mongodb::bson::doc;
use serde::Deserialize;

use crate::{
    audit::{Actor, AuditAction, AuditEvent, AuditSink, Resource, ResourceKind},
    crypto::Codec,
    error::{Error, Result},
    model::{
        validate_email, NewOrganizer, NewVoter, Organizer, OrganizerCore, RequestOrigin, Voter,
        VoterCore,
    },
    notify::{CredentialDelivery, NotificationSink},
    store::{EncryptedColl, Id, Repository},
};

/// Result of an operation that issues credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationOutcome {
    pub id: Id,
    /// False when the account was created but the credential email could
    /// not be sent.
    pub credentials_delivered: bool,
}

/// Partial update to a voter's profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoterUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

/// Manages the voter roll of each organizer.
pub struct VoterRegistry {
    voters: EncryptedColl<Voter>,
    new_voters: EncryptedColl<VoterCore>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationSink>,
}

impl VoterRegistry {
    pub fn new(
        repo: Arc<dyn Repository>,
        codec: Codec,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            voters: EncryptedColl::new(Arc::clone(&repo), codec),
            new_voters: EncryptedColl::new(repo, codec),
            audit,
            notifier,
        }
    }

    /// Register a voter under an organizer, generate their credentials, and
    /// send them off. Delivery failure degrades the outcome instead of
    /// failing it.
    pub async fn register(
        &self,
        organizer: &Organizer,
        new: NewVoter,
        origin: RequestOrigin,
    ) -> Result<RegistrationOutcome> {
        new.validate()?;
        if self.find_by_cnic(organizer, &new.cnic).await?.is_some() {
            return Err(Error::conflict("A voter with this CNIC already exists"));
        }

        let secret = password::generate(password::DEFAULT_LENGTH);
        let core = VoterCore::new(new, organizer.id, password::hash(&secret)?)?;
        let id = self.new_voters.insert(&core).await?;

        self.audit
            .record(AuditEvent::new(
                AuditAction::VoterCreated,
                Actor::organizer(organizer.id, organizer.name.clone()),
                Resource::new(ResourceKind::Voter, id),
                format!("Voter \"{}\" registered", core.name),
                origin,
            ))
            .await;

        let credentials_delivered = self
            .deliver(id, core.email, core.name, core.cnic, secret)
            .await;
        Ok(RegistrationOutcome {
            id,
            credentials_delivered,
        })
    }

    /// Look up a voter on the organizer's roll by CNIC. Scans the
    /// collection, since the stored CNIC is non-deterministic ciphertext.
    pub async fn find_by_cnic(&self, organizer: &Organizer, cnic: &str) -> Result<Option<Voter>> {
        Ok(self
            .voters
            .find_equal("cnic", cnic)
            .await?
            .into_iter()
            .find(|voter| voter.organizer == organizer.id))
    }

    /// Fetch a voter, enforcing that they belong to the organizer.
    pub async fn get(&self, organizer: &Organizer, id: Id) -> Result<Voter> {
        let voter = self
            .voters
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Voter with ID '{id}'")))?;
        if voter.organizer != organizer.id {
            return Err(Error::unauthorized("Not authorized to access this voter"));
        }
        Ok(voter)
    }

    /// All voters on the organizer's roll.
    pub async fn list(&self, organizer: &Organizer) -> Result<Vec<Voter>> {
        self.voters
            .find_all(doc! { "organizer": organizer.id })
            .await
    }

    pub async fn update_profile(
        &self,
        organizer: &Organizer,
        id: Id,
        update: VoterUpdate,
        origin: RequestOrigin,
    ) -> Result<Voter> {
        self.get(organizer, id).await?;

        let mut patch = doc! {};
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(Error::validation("Voter name must not be empty"));
            }
            patch.insert("name", name);
        }
        if let Some(email) = update.email {
            validate_email(&email)?;
            patch.insert("email", email);
        }
        if let Some(is_active) = update.is_active {
            patch.insert("is_active", is_active);
        }
        if patch.is_empty() {
            return Err(Error::validation("Nothing to update"));
        }

        let voter = self.voters.update_by_id(id, patch).await?;
        self.audit
            .record(AuditEvent::new(
                AuditAction::VoterUpdated,
                Actor::organizer(organizer.id, organizer.name.clone()),
                Resource::new(ResourceKind::Voter, id),
                format!("Voter \"{}\" updated", voter.name),
                origin,
            ))
            .await;
        Ok(voter)
    }

    /// Deactivate a voter. Their record and their cast ballots remain; they
    /// can no longer authenticate or vote.
    pub async fn deactivate(
        &self,
        organizer: &Organizer,
        id: Id,
        origin: RequestOrigin,
    ) -> Result<Voter> {
        self.get(organizer, id).await?;
        let voter = self
            .voters
            .update_by_id(id, doc! { "is_active": false })
            .await?;
        self.audit
            .record(AuditEvent::new(
                AuditAction::VoterDeactivated,
                Actor::organizer(organizer.id, organizer.name.clone()),
                Resource::new(ResourceKind::Voter, id),
                format!("Voter \"{}\" deactivated", voter.name),
                origin,
            ))
            .await;
        Ok(voter)
    }

    /// Issue a fresh password for a voter and send it out.
    pub async fn reset_credentials(
        &self,
        organizer: &Organizer,
        id: Id,
        origin: RequestOrigin,
    ) -> Result<RegistrationOutcome> {
        self.get(organizer, id).await?;

        let secret = password::generate(password::DEFAULT_LENGTH);
        let voter = self
            .voters
            .update_by_id(id, doc! { "password_hash": password::hash(&secret)? })
            .await?;

        self.audit
            .record(AuditEvent::new(
                AuditAction::VoterCredentialsReset,
                Actor::organizer(organizer.id, organizer.name.clone()),
                Resource::new(ResourceKind::Voter, id),
                format!("Credentials reset for voter \"{}\"", voter.name),
                origin,
            ))
            .await;

        let credentials_delivered = self
            .deliver(
                id,
                voter.email.clone(),
                voter.name.clone(),
                voter.cnic.clone(),
                secret,
            )
            .await;
        Ok(RegistrationOutcome {
            id,
            credentials_delivered,
        })
    }

    /// Authenticate a voter by CNIC and password.
    pub async fn authenticate(&self, cnic: &str, secret: &str) -> Result<Voter> {
        let voter = self
            .voters
            .find_one_equal("cnic", cnic)
            .await?
            .filter(|voter| password::verify(&voter.password_hash, secret))
            .ok_or_else(|| Error::unauthorized("Invalid CNIC or password"))?;
        if !voter.is_active {
            return Err(Error::unauthorized("This voter account is deactivated"));
        }
        Ok(voter)
    }

    async fn deliver(
        &self,
        id: Id,
        destination: String,
        name: String,
        identifier: String,
        secret: String,
    ) -> bool {
        let delivery = CredentialDelivery {
            destination,
            name,
            identifier,
            secret,
        };
        match self.notifier.deliver(delivery).await {
            Ok(()) => true,
            Err(err) => {
                // Log the record ID, never the CNIC or the secret.
                warn!("Credential delivery for voter '{id}' failed: {err}");
                false
            }
        }
    }
}

/// Manages organizer accounts.
pub struct OrganizerRegistry {
    organizers: EncryptedColl<Organizer>,
    new_organizers: EncryptedColl<OrganizerCore>,
    audit: Arc<dyn AuditSink>,
}

impl OrganizerRegistry {
    pub fn new(repo: Arc<dyn Repository>, codec: Codec, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            organizers: EncryptedColl::new(Arc::clone(&repo), codec),
            new_organizers: EncryptedColl::new(repo, codec),
            audit,
        }
    }

    pub async fn sign_up(&self, new: NewOrganizer, origin: RequestOrigin) -> Result<Organizer> {
        new.validate()?;
        if self
            .organizers
            .find_one_equal("email", &new.email)
            .await?
            .is_some()
        {
            return Err(Error::conflict(
                "An organizer with this email already exists",
            ));
        }

        let core = OrganizerCore::new(new.name, new.email, password::hash(&new.password)?);
        let id = self.new_organizers.insert(&core).await?;

        self.audit
            .record(AuditEvent::new(
                AuditAction::OrganizerSignup,
                Actor::organizer(id, core.name.clone()),
                Resource::new(ResourceKind::Organizer, id),
                format!("Organizer \"{}\" signed up", core.name),
                origin,
            ))
            .await;
        Ok(Organizer { id, core })
    }

    /// Authenticate an organizer by email and password.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Organizer> {
        let organizer = self
            .organizers
            .find_one_equal("email", email)
            .await?
            .filter(|organizer| organizer.verify_password(password))
            .ok_or_else(|| Error::unauthorized("Invalid email or password"))?;
        if !organizer.is_active {
            return Err(Error::unauthorized("This account is deactivated"));
        }
        Ok(organizer)
    }

    pub async fn get(&self, id: Id) -> Result<Organizer> {
        self.organizers
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Organizer with ID '{id}'")))
    }
}
