use serde::{Deserialize, Serialize};

/// Where a request came from, as far as the caller could tell.
///
/// Both fields are optional; an absent value is stored as absent rather than
/// as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOrigin {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[cfg(test)]
impl RequestOrigin {
    pub fn example() -> Self {
        Self {
            ip_address: Some("203.0.113.7".to_string()),
            user_agent: Some("Mozilla/5.0 (X11; Linux x86_64)".to_string()),
        }
    }
}
