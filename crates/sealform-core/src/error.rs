//! Vault error types.
//!
//! Domain errors tell the caller what to fix; infrastructure errors
//! (`Storage`, `Signing`, `Encoding`) are surfaced generically by the HTTP layer and
//! logged with their cause.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors returned by vault operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// Malformed or missing input. Fix the request and retry.
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Authenticated, but not allowed to touch this tenant's scale.
    #[error("forbidden")]
    Forbidden,

    /// Referenced scale, key, job or response does not exist (or the
    /// presented capability does not redeem it).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Export throttle tripped for the tenant.
    #[error("too many export requests, retry in {retry_after_secs}s")]
    TooManyRequests {
        /// Seconds until the tenant may request a new job
        retry_after_secs: u64,
    },

    /// Bot check missing, errored or failed. Retry with a fresh token.
    #[error("turnstile verification failed")]
    TurnstileVerificationFailed,

    /// Storage back-end failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A configured manifest signer failed.
    #[error("manifest signing failed: {0}")]
    Signing(String),

    /// The export manifest could not be serialized.
    #[error("manifest encoding failed: {0}")]
    Encoding(String),
}

impl VaultError {
    /// Shorthand for [`VaultError::Invalid`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Returns true if retrying the same call later may succeed.
    ///
    /// Throttling, bot-check and infrastructure failures are retryable.
    /// Invalid input, missing authorization and unknown ids are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TooManyRequests { .. }
                | Self::TurnstileVerificationFailed
                | Self::Storage(_)
                | Self::Signing(_)
        )
    }
}
