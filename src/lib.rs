//! Data-access core for an online voting service.
//!
//! Identity records (voter names, emails, national IDs) are stored encrypted
//! at rest via a transparent field-level codec, while remaining queryable by
//! exact value through decrypt-and-compare scans. Vote records carry a
//! storage-enforced "one ballot per voter per poll" guarantee, and poll
//! results are tallied on demand from the append-only vote set.
//!
//! The HTTP surface (routing, JWT auth, rate limiting) lives elsewhere and
//! consumes this crate; audit recording and credential delivery are reached
//! through the [`audit::AuditSink`] and [`notify::NotificationSink`] traits.

pub mod audit;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod model;
pub mod notify;
pub mod store;
pub mod voting;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use crypto::Codec;
pub use error::{Error, Result};
pub use store::Id;
