//! External collaborators consumed by the vault.
//!
//! The bot check and manifest signing happen outside this crate. Both are
//! blocking calls; the vault invokes them inline.

use thiserror::Error;

/// Errors from a Turnstile verifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifierError {
    /// Could not reach the verification service or read its answer.
    #[error("turnstile transport error: {0}")]
    Transport(String),

    /// The verification service rejected our own configuration (bad secret,
    /// malformed request).
    #[error("turnstile configuration error: {0}")]
    Config(String),
}

/// Bot-check verifier for scales with Turnstile enabled.
pub trait TurnstileVerifier: Send + Sync {
    /// Check a client-supplied Turnstile token.
    ///
    /// `Ok(false)` means the service answered and the token did not pass.
    fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool, VerifierError>;
}

/// Error from a manifest signer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("signer error: {0}")]
pub struct SignerError(pub String);

/// Signs serialized export manifests.
pub trait ManifestSigner: Send + Sync {
    /// Signature over `message`, encoded for transport.
    fn sign(&self, message: &[u8]) -> Result<String, SignerError>;
}
