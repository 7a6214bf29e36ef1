//! Projection of the server-side user record

use serde::{Deserialize, Serialize};

/// The authenticated user, as returned by `GET users/me/`
///
/// Role flags mirror the platform's model: every account is a client,
/// accounts with a provider profile can additionally act as providers and
/// carry `current_mode` to say which side they are currently using.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub is_client: bool,
    #[serde(default)]
    pub is_provider: bool,
    /// "provider" when the account is acting as a provider, absent otherwise
    #[serde(default)]
    pub current_mode: Option<String>,
    /// Region the account is assigned to
    #[serde(default)]
    pub region: Option<i64>,
    #[serde(default)]
    pub postal_code: Option<String>,
    /// Active subscription, if any
    #[serde(default)]
    pub subscription: Option<i64>,
}

impl AuthenticatedUser {
    /// Whether the account is currently acting as a provider
    pub fn in_provider_mode(&self) -> bool {
        self.is_provider && self.current_mode.as_deref() == Some("provider")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserializes_server_projection() {
        let raw = r#"{
            "id": 7,
            "email": "alice@example.com",
            "username": "alice",
            "is_client": true,
            "is_provider": true,
            "current_mode": "provider",
            "region": 3,
            "postal_code": "60311",
            "subscription": null
        }"#;
        let user: AuthenticatedUser = serde_json::from_str(raw).unwrap();
        assert_eq!(user.username, "alice");
        assert!(user.in_provider_mode());
        assert_eq!(user.subscription, None);
    }

    #[test]
    fn test_tolerates_missing_optional_fields() {
        let raw = r#"{"id": 1, "email": "b@example.com", "username": "bob"}"#;
        let user: AuthenticatedUser = serde_json::from_str(raw).unwrap();
        assert!(!user.is_provider);
        assert!(!user.in_provider_mode());
        assert_eq!(user.region, None);
    }
}
