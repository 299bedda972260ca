//! Cloudflare Turnstile verifier.
//!
//! Blocking HTTPS client for the siteverify endpoint. The vault calls it
//! inline during intake, so the HTTP layer runs intake on a blocking thread.

use std::{fmt, time::Duration};

use sealform_core::{TurnstileVerifier, VerifierError};
use serde::Deserialize;
use tracing::warn;

/// Production siteverify endpoint.
pub const SITEVERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

const TIMEOUT: Duration = Duration::from_secs(5);

/// Siteverify answer. Fields we don't read are ignored.
#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Verifies Turnstile tokens against Cloudflare.
#[derive(Clone)]
pub struct CloudflareTurnstile {
    agent: ureq::Agent,
    secret: String,
    endpoint: String,
}

impl CloudflareTurnstile {
    /// Verifier for the production endpoint.
    pub fn new(secret: impl Into<String>) -> Self {
        Self::with_endpoint(secret, SITEVERIFY_URL)
    }

    /// Verifier for a custom endpoint (staging, local stub).
    pub fn with_endpoint(secret: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(TIMEOUT)
            .timeout_read(TIMEOUT)
            .timeout_write(TIMEOUT)
            .build();

        Self { agent, secret: secret.into(), endpoint: endpoint.into() }
    }
}

impl TurnstileVerifier for CloudflareTurnstile {
    fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool, VerifierError> {
        let mut form = vec![("secret", self.secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = match self.agent.post(&self.endpoint).send_form(&form) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(VerifierError::Transport(format!("siteverify returned {code}")));
            },
            Err(ureq::Error::Transport(err)) => {
                return Err(VerifierError::Transport(err.to_string()));
            },
        };

        let answer: SiteverifyResponse =
            response.into_json().map_err(|e| VerifierError::Transport(e.to_string()))?;
        classify(answer)
    }
}

/// Turn a siteverify answer into a verdict.
///
/// Problems with our own secret or request are configuration errors, a
/// Cloudflare-side failure is a transport error, and everything else about
/// the token is a plain rejection.
fn classify(answer: SiteverifyResponse) -> Result<bool, VerifierError> {
    if answer.success {
        return Ok(true);
    }

    for code in &answer.error_codes {
        match code.as_str() {
            "missing-input-secret" | "invalid-input-secret" | "bad-request" => {
                return Err(VerifierError::Config(code.clone()));
            },
            "internal-error" => return Err(VerifierError::Transport(code.clone())),
            _ => {},
        }
    }

    warn!(codes = ?answer.error_codes, "turnstile token rejected");
    Ok(false)
}

impl fmt::Debug for CloudflareTurnstile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareTurnstile")
            .field("endpoint", &self.endpoint)
            .field("secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}
