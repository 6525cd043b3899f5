use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable holding the encryption key.
const ENCRYPTION_KEY_VAR: &str = "ENCRYPTION_KEY";

/// Application configuration. Loaded once at startup and read-only from
/// then on; the embedding process must treat a load failure as fatal.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    encryption_key: String,
}

impl Config {
    /// Build a config from an explicit key. Fails on an empty key: the
    /// process must never run with attribute encryption silently disabled.
    pub fn new(encryption_key: impl Into<String>) -> Result<Self> {
        let encryption_key = encryption_key.into();
        if encryption_key.is_empty() {
            return Err(Error::validation(format!(
                "{ENCRYPTION_KEY_VAR} must not be empty"
            )));
        }
        Ok(Self { encryption_key })
    }

    /// Load the config from the environment.
    /// Configured via `ENCRYPTION_KEY`.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(ENCRYPTION_KEY_VAR)
            .map_err(|_| Error::validation(format!("{ENCRYPTION_KEY_VAR} is not set")))?;
        Self::new(key)
    }

    /// Key material for the attribute codec.
    pub fn encryption_key(&self) -> &str {
        &self.encryption_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(Config::new(""), Err(Error::Validation(_))));
        assert!(Config::new("a perfectly fine key").is_ok());
    }

    #[test]
    fn from_env_requires_the_key() {
        // Set and unset sequentially in one test; the environment is
        // process-global and tests run in parallel.
        std::env::remove_var(ENCRYPTION_KEY_VAR);
        assert!(Config::from_env().is_err());

        std::env::set_var(ENCRYPTION_KEY_VAR, "from-the-environment");
        let config = Config::from_env().unwrap();
        assert_eq!(config.encryption_key(), "from-the-environment");
        std::env::remove_var(ENCRYPTION_KEY_VAR);
    }
}
