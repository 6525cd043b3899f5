//! Outbound credential delivery.
//!
//! The core never sends email itself; it hands a [`CredentialDelivery`] to
//! whatever sink the host application wires in. Delivery failure is a
//! degraded outcome, not a rollback: the account already exists and the
//! organizer is told delivery did not happen.

use async_trait::async_trait;

use crate::error::Result;

/// A freshly issued credential on its way to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialDelivery {
    /// Email address to deliver to.
    pub destination: String,
    /// Recipient's display name.
    pub name: String,
    /// The identifier they will log in with.
    pub identifier: String,
    /// The generated password, in the clear. Exists only in transit; the
    /// store keeps only the hash.
    pub secret: String,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, delivery: CredentialDelivery) -> Result<()>;
}
