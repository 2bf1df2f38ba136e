//! JSON wire types for the device-facing API
//!
//! Field names are `snake_case` so game clients can deserialize them
//! without renaming.

use serde::{Deserialize, Serialize};

/// Public identity of a user, safe to hand to a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub username: String,
}

/// Response to `POST /api/game/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePairingResponse {
    /// Pairing request ID
    pub id: String,
    /// Link the user opens in a signed-in browser
    pub url: String,
    /// Device polling secret, returned only here
    pub token: String,
    /// Seconds until the request expires
    pub expires_in: i64,
}

/// Where a pairing stands from the device's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStateKind {
    Pending,
    Approved,
    Exchanged,
}

/// Approval details returned once a user approved the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalInfo {
    /// Approval ID to present to `/api/game/exchange`
    pub id: String,
    /// The approving user
    pub user: UserIdentity,
}

/// Response to `GET /api/game/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingStateResponse {
    pub id: String,
    pub state: PairingStateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalInfo>,
}

/// Body of `POST /api/game/exchange`
///
/// Absent fields deserialize as empty so the server can report them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeRequest {
    pub approval_id: String,
    /// The device polling secret from pairing creation
    pub token: String,
}

/// Response to `POST /api/game/exchange`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeResponse {
    /// Credential ID, sent as `X-Game-Login-ID`
    pub id: String,
    /// Credential secret, sent as `X-Game-Login-Token`
    pub token: String,
    pub user: UserIdentity,
}

/// Response to `GET /api/game/me`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIdentityResponse {
    pub credential_id: String,
    pub user: UserIdentity,
}

/// Error payload for every failed device-facing call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code, e.g. `NOT_FOUND`
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&PairingStateKind::Exchanged).unwrap();
        assert_eq!(json, "\"exchanged\"");
    }

    #[test]
    fn test_pending_state_omits_approval() {
        let response = PairingStateResponse {
            id: "r1".to_string(),
            state: PairingStateKind::Pending,
            approval: None,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["state"], "pending");
        assert!(value.get("approval").is_none());
    }
}
