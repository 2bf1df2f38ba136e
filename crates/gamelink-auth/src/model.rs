//! Pairing entities
//!
//! The three rows of a pairing form a chain: a request optionally links to
//! an approval, which optionally links to a credential. Links are written
//! once and never cleared.

use crate::session::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID string
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

entity_id!(
    /// Identifier of a pairing request, embedded in the pairing URL
    RequestId
);
entity_id!(
    /// Identifier of an approval, handed to the device for exchange
    ApprovalId
);
entity_id!(
    /// Identifier of a device credential, sent with every device call
    CredentialId
);

/// A device's request to be paired, created before any user is involved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingRequest {
    pub id: RequestId,
    /// Hash of the device polling secret
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set once, when a user approves
    pub approval_id: Option<ApprovalId>,
}

impl PairingRequest {
    pub fn new(secret_hash: String, created_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: RequestId::new(),
            secret_hash,
            created_at,
            expires_at,
            approval_id: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A signed-in user's consent to a pairing request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingApproval {
    pub id: ApprovalId,
    /// Request this approval answers
    pub request_id: RequestId,
    pub user_id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set once, when the device exchanges the approval
    pub credential_id: Option<CredentialId>,
}

impl PairingApproval {
    pub fn new(
        request_id: RequestId,
        user: &User,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ApprovalId::new(),
            request_id,
            user_id: user.id.clone(),
            username: user.username.clone(),
            created_at,
            expires_at,
            credential_id: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The approving user
    pub fn user(&self) -> User {
        User::new(self.user_id.clone(), self.username.clone())
    }
}

/// Durable device identity issued by a successful exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingCredential {
    pub id: CredentialId,
    pub user_id: String,
    pub username: String,
    /// Hash of the credential secret
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
}

impl PairingCredential {
    /// Issue a credential to the user of `approval`
    pub fn for_approval(
        approval: &PairingApproval,
        secret_hash: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CredentialId::new(),
            user_id: approval.user_id.clone(),
            username: approval.username.clone(),
            secret_hash,
            created_at,
        }
    }

    pub fn user(&self) -> User {
        User::new(self.user_id.clone(), self.username.clone())
    }
}

/// A request together with the approval it links to
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub request: PairingRequest,
    pub approval: Option<PairingApproval>,
}

/// An approval together with the credential it links to
#[derive(Debug, Clone)]
pub struct ApprovalRecord {
    pub approval: PairingApproval,
    pub credential: Option<PairingCredential>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_id_generation() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_id_parse_roundtrip() {
        let id = ApprovalId::new();
        let parsed: ApprovalId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(CredentialId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_request_expiry() {
        let now = Utc::now();
        let request = PairingRequest::new("hash".to_string(), now, now + Duration::minutes(5));
        assert!(!request.is_expired(now));
        assert!(!request.is_expired(now + Duration::minutes(5)));
        assert!(request.is_expired(now + Duration::minutes(5) + Duration::seconds(1)));
        assert!(request.approval_id.is_none());
    }

    #[test]
    fn test_credential_copies_approver() {
        let now = Utc::now();
        let user = User::new("u1", "alice");
        let approval = PairingApproval::new(RequestId::new(), &user, now, now + Duration::minutes(5));
        let credential = PairingCredential::for_approval(&approval, "hash".to_string(), now);
        assert_eq!(credential.user(), user);
        assert_eq!(approval.user(), user);
    }
}
