//! API error responses
//!
//! Every failed device-facing call answers with an [`ErrorResponse`] body
//! and a status code matching the failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gamelink_auth::PairingError;
use gamelink_core::ErrorResponse;
use thiserror::Error;
use tracing::error;

/// Errors returned by HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pairing(#[from] PairingError),
    #[error("Missing parameters: {0}")]
    MissingParameters(String),
    #[error("Missing device credentials")]
    MissingCredentials,
}

impl ApiError {
    pub fn missing(names: &str) -> Self {
        ApiError::MissingParameters(names.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_and_code().0
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        self.status_and_code().1
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Pairing(e) => match e {
                PairingError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                PairingError::Expired => (StatusCode::GONE, "EXPIRED"),
                PairingError::AlreadyUsed => (StatusCode::CONFLICT, "ALREADY_USED"),
                PairingError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
                PairingError::Storage(_)
                | PairingError::Token(_)
                | PairingError::LifetimeOverflow => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
            ApiError::MissingParameters(_) => (StatusCode::BAD_REQUEST, "MISSING_PARAMETERS"),
            ApiError::MissingCredentials => (StatusCode::UNAUTHORIZED, "MISSING_CREDENTIALS"),
        }
    }

    fn is_internal(&self) -> bool {
        matches!(self, ApiError::Pairing(e) if e.is_internal())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if self.is_internal() {
            error!("Internal error: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamelink_auth::StorageError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PairingError::NotFound, StatusCode::NOT_FOUND, "NOT_FOUND"),
            (PairingError::Expired, StatusCode::GONE, "EXPIRED"),
            (PairingError::AlreadyUsed, StatusCode::CONFLICT, "ALREADY_USED"),
            (PairingError::Unauthorized, StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (
                PairingError::Storage(StorageError::NoConfigDir),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];
        for (error, status, code) in cases {
            let error = ApiError::from(error);
            assert_eq!(error.status_code(), status);
            assert_eq!(error.code(), code);
        }

        assert_eq!(ApiError::missing("id").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::MissingCredentials.code(), "MISSING_CREDENTIALS");
    }

    #[test]
    fn test_internal_details_hidden() {
        let response =
            ApiError::from(PairingError::Storage(StorageError::NoConfigDir)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
