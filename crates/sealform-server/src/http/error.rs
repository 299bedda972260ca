//! HTTP error mapping.
//!
//! Every failure leaves the router as `{code, message}` JSON. Infrastructure
//! failures are logged with their cause and reported generically.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use sealform_core::VaultError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors a handler can return.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Error from the vault
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// A required identity header set by the gateway is missing
    #[error("missing {0} header")]
    Unauthorized(&'static str),

    /// Body or query string could not be parsed
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Handler machinery failed (blocking task panicked or was cancelled)
    #[error("internal error: {0}")]
    Internal(String),
}

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: &'static str,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Vault(err) => match err {
                VaultError::Invalid(_) => StatusCode::BAD_REQUEST,
                VaultError::Forbidden | VaultError::TurnstileVerificationFailed => {
                    StatusCode::FORBIDDEN
                },
                VaultError::NotFound(_) => StatusCode::NOT_FOUND,
                VaultError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
                VaultError::Storage(_) | VaultError::Signing(_) | VaultError::Encoding(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                },
            },
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Vault(err) => match err {
                VaultError::Invalid(_) => "INVALID_REQUEST",
                VaultError::Forbidden => "FORBIDDEN",
                VaultError::NotFound(_) => "NOT_FOUND",
                VaultError::TooManyRequests { .. } => "RATE_LIMITED",
                VaultError::TurnstileVerificationFailed => "TURNSTILE_FAILED",
                VaultError::Storage(_) | VaultError::Signing(_) | VaultError::Encoding(_) => {
                    "INTERNAL_ERROR"
                },
            },
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Malformed(_) => "INVALID_REQUEST",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show the caller.
    fn public_message(&self) -> String {
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
        }

        let body = ErrorResponse { code: self.error_code(), message: self.public_message() };
        let mut response = (status, Json(body)).into_response();

        if let Self::Vault(VaultError::TooManyRequests { retry_after_secs }) = self {
            response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use sealform_core::StorageError;

    use super::*;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let cases = [
            (VaultError::invalid("x"), StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            (VaultError::Forbidden, StatusCode::FORBIDDEN, "FORBIDDEN"),
            (VaultError::NotFound("scale"), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (VaultError::TurnstileVerificationFailed, StatusCode::FORBIDDEN, "TURNSTILE_FAILED"),
        ];

        for (err, status, code) in cases {
            let err = ApiError::from(err);
            assert_eq!(err.status_code(), status);
            assert_eq!(err.error_code(), code);
        }
    }

    #[test]
    fn throttle_sets_retry_after() {
        let response =
            ApiError::from(VaultError::TooManyRequests { retry_after_secs: 7 }).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "7");
    }

    #[test]
    fn infrastructure_errors_hide_their_cause() {
        let err = ApiError::from(VaultError::Storage(StorageError::Io("/var/db locked".into())));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "internal error");

        let err = ApiError::from(VaultError::Signing("key unavailable".into()));
        assert_eq!(err.public_message(), "internal error");

        let err = ApiError::from(VaultError::Encoding("manifest".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert_eq!(err.public_message(), "internal error");
    }

    #[test]
    fn missing_identity_is_unauthorized() {
        let err = ApiError::Unauthorized("x-tenant-id");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "missing x-tenant-id header");
    }
}
