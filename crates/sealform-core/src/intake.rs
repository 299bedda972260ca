//! Intake Pipeline
//!
//! Accepts encrypted submissions from participants. The payload is opaque;
//! only its shape is checked. Successful intake is not audited, and the
//! self token minted here is returned to the submitter and nobody else.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    access::scale_target,
    audit,
    capability::{self, SELF_TOKEN_BYTES},
    collaborators::TurnstileVerifier,
    env::Environment,
    error::VaultError,
    keys::active_key,
    model::{AuditAction, E2eeResponse, ExportedResponse, Scale},
    storage::{Storage, StorageError},
};

/// Actor recorded for participant-initiated audit entries.
const PARTICIPANT_ACTOR: &str = "participant";

/// Size limits applied before anything is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakeLimits {
    /// Maximum ciphertext length in bytes (as encoded by the client)
    pub max_ciphertext_len: usize,
    /// Maximum number of wrapped DEKs at submission time
    pub max_enc_dek: usize,
}

impl Default for IntakeLimits {
    fn default() -> Self {
        Self { max_ciphertext_len: 1024 * 1024, max_enc_dek: 16 }
    }
}

/// An encrypted submission as sent by the participant's client.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IntakeRequest {
    /// Target scale
    pub scale_id: String,
    /// Client-chosen id; minted when absent
    pub response_id: Option<String>,
    /// Opaque AEAD ciphertext
    pub ciphertext: String,
    /// Opaque AEAD nonce
    pub nonce: String,
    /// Hash of the associated data
    pub aad_hash: String,
    /// DEK wrapped under the project key(s)
    pub enc_dek: Vec<String>,
    /// Key the DEK was wrapped under; defaults to the scale's active key
    pub pmk_fingerprint: Option<String>,
    /// Bot-check token, when the scale requires one
    pub turnstile_token: Option<String>,
}

impl fmt::Debug for IntakeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntakeRequest")
            .field("scale_id", &self.scale_id)
            .field("response_id", &self.response_id)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("enc_dek", &self.enc_dek.len())
            .field("pmk_fingerprint", &self.pmk_fingerprint)
            .finish_non_exhaustive()
    }
}

/// Returned to the submitter only.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct IntakeReceipt {
    /// Stored response id
    pub response_id: String,
    /// Capability for self-export and self-delete
    pub self_token: String,
}

impl fmt::Debug for IntakeReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntakeReceipt")
            .field("response_id", &self.response_id)
            .field("self_token", &"<redacted>")
            .finish()
    }
}

/// Validates and persists encrypted responses.
#[derive(Clone)]
pub struct IntakePipeline<E, S> {
    env: E,
    storage: S,
    limits: IntakeLimits,
}

impl<E: Environment, S: Storage> IntakePipeline<E, S> {
    /// Create a pipeline with the given limits.
    pub fn new(env: E, storage: S, limits: IntakeLimits) -> Self {
        Self { env, storage, limits }
    }

    /// Validate, bot-check and persist one submission.
    ///
    /// `verifier` may be `None`; a scale with Turnstile enabled then rejects
    /// every submission.
    pub fn intake(
        &self,
        request: IntakeRequest,
        verifier: Option<&dyn TurnstileVerifier>,
        remote_ip: Option<&str>,
    ) -> Result<IntakeReceipt, VaultError> {
        self.validate(&request)?;

        let Some(scale) = self.storage.get_scale(&request.scale_id)? else {
            return Err(VaultError::NotFound("scale"));
        };

        check_turnstile(&scale, request.turnstile_token.as_deref(), verifier, remote_ip)?;

        let response_id = match request.response_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => capability::mint_id(&self.env),
        };
        let pmk_fingerprint = match request.pmk_fingerprint.filter(|fp| !fp.trim().is_empty()) {
            Some(fp) => fp,
            None => active_key(&self.storage, &scale.id)?
                .map(|k| k.fingerprint)
                .unwrap_or_default(),
        };

        let response = E2eeResponse {
            scale_id: scale.id,
            response_id,
            ciphertext: request.ciphertext,
            nonce: request.nonce,
            aad_hash: request.aad_hash,
            enc_dek: request.enc_dek,
            pmk_fingerprint,
            created_at: self.env.wall_clock_secs(),
            self_token: capability::mint_token(&self.env, SELF_TOKEN_BYTES),
        };

        self.storage.add_e2ee_response(&response).map_err(|e| match e {
            StorageError::Duplicate { .. } => VaultError::invalid("response_id already exists"),
            other => other.into(),
        })?;

        info!(scale = %response.scale_id, "e2ee response stored");

        Ok(IntakeReceipt { response_id: response.response_id, self_token: response.self_token })
    }

    /// Participant fetches their own response.
    ///
    /// Unknown id and wrong token are both `NotFound`.
    pub fn self_export(
        &self,
        response_id: &str,
        self_token: &str,
    ) -> Result<ExportedResponse, VaultError> {
        Ok(self.redeem(response_id, self_token)?.exported())
    }

    /// Participant deletes their own response.
    ///
    /// The audit entry names the scale, not the response.
    pub fn self_delete(&self, response_id: &str, self_token: &str) -> Result<(), VaultError> {
        let response = self.redeem(response_id, self_token)?;

        if !self.storage.delete_e2ee_response(&response.response_id)? {
            return Err(VaultError::NotFound("response"));
        }

        info!(scale = %response.scale_id, "e2ee response deleted by participant");
        audit::record_after_commit(
            &self.env,
            &self.storage,
            PARTICIPANT_ACTOR,
            AuditAction::E2eeSelfDelete,
            scale_target(&response.scale_id),
            String::new(),
        );

        Ok(())
    }

    fn redeem(&self, response_id: &str, self_token: &str) -> Result<E2eeResponse, VaultError> {
        match self.storage.get_e2ee_response(response_id)? {
            Some(response) if capability::tokens_match(self_token, &response.self_token) => {
                Ok(response)
            },
            _ => {
                debug!("self token did not redeem");
                Err(VaultError::NotFound("response"))
            },
        }
    }

    fn validate(&self, request: &IntakeRequest) -> Result<(), VaultError> {
        for (field, value) in [
            ("scale_id", &request.scale_id),
            ("ciphertext", &request.ciphertext),
            ("nonce", &request.nonce),
        ] {
            if value.trim().is_empty() {
                return Err(VaultError::invalid(format!("{field} is required")));
            }
        }

        if request.enc_dek.is_empty() {
            return Err(VaultError::invalid("enc_dek must have at least one entry"));
        }
        if request.enc_dek.iter().any(|dek| dek.trim().is_empty()) {
            return Err(VaultError::invalid("enc_dek entries must not be blank"));
        }
        if request.enc_dek.len() > self.limits.max_enc_dek {
            return Err(VaultError::invalid(format!(
                "enc_dek has more than {} entries",
                self.limits.max_enc_dek
            )));
        }
        if request.ciphertext.len() > self.limits.max_ciphertext_len {
            return Err(VaultError::invalid(format!(
                "ciphertext exceeds {} bytes",
                self.limits.max_ciphertext_len
            )));
        }

        Ok(())
    }
}

fn check_turnstile(
    scale: &Scale,
    token: Option<&str>,
    verifier: Option<&dyn TurnstileVerifier>,
    remote_ip: Option<&str>,
) -> Result<(), VaultError> {
    if !scale.turnstile_enabled {
        return Ok(());
    }

    let Some(verifier) = verifier else {
        warn!(scale = %scale.id, "turnstile required but no verifier configured");
        return Err(VaultError::TurnstileVerificationFailed);
    };
    let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
        debug!(scale = %scale.id, "turnstile token missing");
        return Err(VaultError::TurnstileVerificationFailed);
    };

    match verifier.verify(token, remote_ip) {
        Ok(true) => Ok(()),
        Ok(false) => {
            debug!(scale = %scale.id, "turnstile token rejected");
            Err(VaultError::TurnstileVerificationFailed)
        },
        Err(e) => {
            warn!(scale = %scale.id, error = %e, "turnstile verifier failed");
            Err(VaultError::TurnstileVerificationFailed)
        },
    }
}
