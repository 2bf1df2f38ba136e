//! Device credential guard
//!
//! [`DeviceAuth`] is an extractor: a handler that takes it as an argument
//! only runs once the request carries a valid device credential.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use gamelink_auth::{AuthenticatedDevice, CredentialId, PairingError};
use std::sync::Arc;
use tracing::debug;

/// Header carrying the credential ID
pub const CREDENTIAL_ID_HEADER: &str = "x-game-login-id";

/// Header carrying the credential secret
pub const CREDENTIAL_TOKEN_HEADER: &str = "x-game-login-token";

/// The authenticated device behind the current request
#[derive(Debug, Clone)]
pub struct DeviceAuth(pub AuthenticatedDevice);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for DeviceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (id, secret) =
            extract_credentials(&parts.headers).ok_or(ApiError::MissingCredentials)?;

        let Ok(id) = CredentialId::parse(&id) else {
            debug!("Rejected malformed credential ID");
            return Err(PairingError::Unauthorized.into());
        };

        let device = state.pairing.authenticate_credential(&id, &secret).await?;
        Ok(DeviceAuth(device))
    }
}

/// Read the credential from the dedicated headers, falling back to
/// `Authorization: Bearer <id>.<secret>`
fn extract_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let id = header_value(headers, CREDENTIAL_ID_HEADER);
    let secret = header_value(headers, CREDENTIAL_TOKEN_HEADER);
    if let (Some(id), Some(secret)) = (id, secret) {
        return Some((id, secret));
    }

    let auth = header_value(headers, header::AUTHORIZATION.as_str())?;
    let (id, secret) = auth.strip_prefix("Bearer ")?.split_once('.')?;
    if id.is_empty() || secret.is_empty() {
        return None;
    }
    Some((id.to_string(), secret.to_string()))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CREDENTIAL_ID_HEADER, HeaderValue::from_static("id-1"));
        headers.insert(CREDENTIAL_TOKEN_HEADER, HeaderValue::from_static("secret"));
        assert_eq!(
            extract_credentials(&headers),
            Some(("id-1".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_extract_from_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer id-1.secret"),
        );
        assert_eq!(
            extract_credentials(&headers),
            Some(("id-1".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_extract_missing_or_partial() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_credentials(&headers), None);

        headers.insert(CREDENTIAL_ID_HEADER, HeaderValue::from_static("id-1"));
        assert_eq!(extract_credentials(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer nodot"));
        assert_eq!(extract_credentials(&headers), None);
    }
}
