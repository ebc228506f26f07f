use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{ThemePreference, User};

/// Errors raised while normalizing an inbound registration payload.
#[derive(Debug, Error)]
pub enum RegistrationEventError {
    #[error("failed to parse registration payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("registration payload is missing the identity id")]
    MissingIdentity,
    #[error("identity id {value:?} is not a valid identifier: {source}")]
    InvalidIdentity { value: String, source: uuid::Error },
    #[error("registration payload has no details block")]
    MissingDetails,
}

impl RegistrationEventError {
    /// Coarse classification surfaced in logs and metrics. A missing details
    /// block is merely incomplete; everything else is malformed.
    pub fn class(&self) -> EventFailureClass {
        match self {
            Self::MissingDetails => EventFailureClass::Incomplete,
            _ => EventFailureClass::Malformed,
        }
    }
}

/// Failure classification for dropped registration events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFailureClass {
    Malformed,
    Incomplete,
}

impl EventFailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Incomplete => "incomplete",
        }
    }
}

/// Deterministic normalizer transforming registration payloads into
/// canonical [`User`] values.
pub struct RegistrationNormalizer;

impl RegistrationNormalizer {
    /// Parses a raw registration payload.
    ///
    /// The identity id is validated before the details block is looked at,
    /// so a payload missing both classifies as malformed. Fields absent
    /// inside the details block are left unset on the produced user; only
    /// the wholly-absent block is a failure.
    pub fn normalize(payload: &[u8]) -> Result<User, RegistrationEventError> {
        let data: RegistrationPayload = serde_json::from_slice(payload)?;

        let raw_id = data
            .user_id
            .ok_or(RegistrationEventError::MissingIdentity)?;
        let id = Uuid::parse_str(&raw_id).map_err(|source| {
            RegistrationEventError::InvalidIdentity {
                value: raw_id,
                source,
            }
        })?;

        let details = data.details.ok_or(RegistrationEventError::MissingDetails)?;

        Ok(User {
            id,
            username: details.username,
            email: details.email,
            first_name: details.first_name,
            last_name: details.last_name,
            theme: ThemePreference::default(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RegistrationPayload {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    details: Option<RegistrationDetails>,
}

#[derive(Debug, Deserialize)]
struct RegistrationDetails {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const IDENTITY: &str = "0d4cbc47-c02b-4b4f-95b5-94e5f8bc9c2d";

    fn sample_payload() -> Vec<u8> {
        json!({
            "user_id": IDENTITY,
            "details": {
                "username": "drossi",
                "email": "drossi@x.com",
                "first_name": "Daniele",
                "last_name": "Rossi"
            }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn normalizes_complete_event() {
        let user = RegistrationNormalizer::normalize(&sample_payload()).expect("normalize");
        assert_eq!(user.id, IDENTITY.parse().unwrap());
        assert_eq!(user.username.as_deref(), Some("drossi"));
        assert_eq!(user.email.as_deref(), Some("drossi@x.com"));
        assert_eq!(user.first_name.as_deref(), Some("Daniele"));
        assert_eq!(user.last_name.as_deref(), Some("Rossi"));
        assert_eq!(user.theme, ThemePreference::Light);
    }

    #[test]
    fn partial_details_leave_fields_unset() {
        let payload = json!({
            "user_id": IDENTITY,
            "details": { "username": "drossi" }
        })
        .to_string();
        let user = RegistrationNormalizer::normalize(payload.as_bytes()).expect("normalize");
        assert_eq!(user.username.as_deref(), Some("drossi"));
        assert_eq!(user.email, None);
        assert_eq!(user.first_name, None);
        assert_eq!(user.last_name, None);
    }

    #[test]
    fn missing_identity_is_malformed() {
        let payload = json!({
            "details": { "username": "drossi" }
        })
        .to_string();
        let err = RegistrationNormalizer::normalize(payload.as_bytes()).expect_err("missing id");
        assert!(matches!(err, RegistrationEventError::MissingIdentity));
        assert_eq!(err.class(), EventFailureClass::Malformed);
    }

    #[test]
    fn unparsable_identity_is_malformed_but_distinct() {
        let payload = json!({
            "user_id": "U1",
            "details": { "username": "drossi" }
        })
        .to_string();
        let err = RegistrationNormalizer::normalize(payload.as_bytes()).expect_err("bad id");
        assert!(matches!(err, RegistrationEventError::InvalidIdentity { .. }));
        assert_eq!(err.class(), EventFailureClass::Malformed);
    }

    #[test]
    fn missing_details_is_incomplete() {
        let payload = json!({ "user_id": IDENTITY }).to_string();
        let err = RegistrationNormalizer::normalize(payload.as_bytes()).expect_err("no details");
        assert!(matches!(err, RegistrationEventError::MissingDetails));
        assert_eq!(err.class(), EventFailureClass::Incomplete);
    }

    #[test]
    fn unparsable_payload_is_malformed() {
        let err = RegistrationNormalizer::normalize(b"not-json").expect_err("bad json");
        assert!(matches!(err, RegistrationEventError::Malformed(_)));
        assert_eq!(err.class(), EventFailureClass::Malformed);
    }
}
