//! API error handling module
//!
//! Maps ceremony rejections and server faults onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keygate_core::{KeygateError, Rejection, RejectionClass};
use thiserror::Error;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal error - store or configuration failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Ceremony rejected by the engine
    #[error("{0}")]
    Rejected(Rejection),
}

impl From<KeygateError> for ApiError {
    fn from(err: KeygateError) -> Self {
        match err {
            KeygateError::Rejected(reason) => Self::Rejected(reason),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Rejected(reason) => match reason.class() {
                RejectionClass::NotFound => StatusCode::NOT_FOUND,
                RejectionClass::ProtocolMismatch | RejectionClass::MalformedInput => {
                    StatusCode::BAD_REQUEST
                }
                RejectionClass::Cryptographic => StatusCode::UNAUTHORIZED,
            },
        }
    }

    /// Get the error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Rejected(reason) => reason.code(),
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            // The expected origin is server configuration
            Self::Rejected(Rejection::OriginMismatch { .. }) => "Origin mismatch".to_string(),
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal",
            Self::Rejected(reason) => reason.class().as_str(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        match &self {
            Self::BadRequest(_) => {
                tracing::warn!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Client error"
                );
            }
            Self::Rejected(_) => {
                tracing::info!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Ceremony rejected"
                );
            }
            Self::Internal(_) => {
                tracing::error!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Server error"
                );
            }
        }

        // All error responses include a `code` field for programmatic error handling
        let body = serde_json::json!({
            "error": client_message,
            "code": code,
            "verified": false,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_status_mapping() {
        let cases = [
            (Rejection::UserNotFound, StatusCode::NOT_FOUND),
            (Rejection::MissingChallenge, StatusCode::NOT_FOUND),
            (Rejection::ChallengeMismatch, StatusCode::BAD_REQUEST),
            (
                Rejection::MalformedAttestation("short".into()),
                StatusCode::BAD_REQUEST,
            ),
            (Rejection::SignatureInvalid, StatusCode::UNAUTHORIZED),
            (
                Rejection::StaleCounter {
                    stored: 5,
                    reported: 5,
                },
                StatusCode::UNAUTHORIZED,
            ),
        ];
        for (reason, status) in cases {
            assert_eq!(ApiError::Rejected(reason).status_code(), status);
        }
    }

    #[test]
    fn test_storage_error_is_internal() {
        let err: ApiError = KeygateError::Storage("connection reset".into()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[test]
    fn test_origin_not_leaked() {
        let err = ApiError::Rejected(Rejection::OriginMismatch {
            expected: "http://localhost:10001".into(),
            actual: "http://evil.test".into(),
        });
        assert!(!err.client_message().contains("localhost"));
        assert_eq!(err.error_code(), "ORIGIN_MISMATCH");
    }
}
