use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// Carries no detail by design; the cause is logged server-side only.
    #[error("Failed to read stored record")]
    Decryption,
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Db(#[from] mongodb::error::Error),
    #[error(transparent)]
    Serialize(#[from] mongodb::bson::ser::Error),
    #[error(transparent)]
    Deserialize(#[from] mongodb::bson::de::Error),
    #[error(transparent)]
    Argon2(#[from] argon2::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }
}
