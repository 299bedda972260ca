//! Domain records.
//!
//! Ciphertext, nonces and wrapped DEKs are opaque strings (client-encoded,
//! usually base64). Nothing in this crate interprets them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A survey scale as seen by this subsystem.
///
/// Scales are authored elsewhere; the vault only reads ownership and the
/// bot-check flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scale {
    /// Scale identifier
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Whether submissions must pass a Turnstile check
    #[serde(default)]
    pub turnstile_enabled: bool,
}

/// A project public key registered for a scale.
///
/// Never deleted. Superseded keys are marked `disabled` so responses wrapped
/// under them stay decryptable by whoever holds the retired private key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectKey {
    /// Scale this key belongs to
    pub scale_id: String,
    /// Key-wrapping algorithm label, e.g. `X25519+XChaCha20-Poly1305`
    pub algorithm: String,
    /// KDF label, e.g. `HKDF-SHA256`
    pub kdf: String,
    /// Encoded public key
    pub public_key: String,
    /// Stable short identifier for `public_key`
    pub fingerprint: String,
    /// Unix seconds
    pub created_at: u64,
    /// Retired keys are kept but no longer offered for new submissions
    pub disabled: bool,
}

/// Key material supplied by a tenant admin when registering a key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewProjectKey {
    /// Key-wrapping algorithm label
    pub algorithm: String,
    /// KDF label
    pub kdf: String,
    /// Encoded public key
    pub public_key: String,
    /// Fingerprint of `public_key`
    pub fingerprint: String,
}

/// A stored encrypted response.
///
/// `enc_dek` only ever grows: index 0 is the DEK wrapped at submission time,
/// later entries are appended by rewraps.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct E2eeResponse {
    /// Scale the response was submitted to
    pub scale_id: String,
    /// Response identifier
    pub response_id: String,
    /// Opaque AEAD ciphertext
    pub ciphertext: String,
    /// Opaque AEAD nonce
    pub nonce: String,
    /// Hash of the associated data the client bound into the AEAD
    pub aad_hash: String,
    /// Wrapped DEKs, oldest first
    pub enc_dek: Vec<String>,
    /// Fingerprint of the project key the first DEK was wrapped under
    pub pmk_fingerprint: String,
    /// Unix seconds
    pub created_at: u64,
    /// Participant capability for self-export and self-delete
    pub self_token: String,
}

impl E2eeResponse {
    /// Projection released in export bundles (everything but the self token).
    pub fn exported(&self) -> ExportedResponse {
        ExportedResponse {
            scale_id: self.scale_id.clone(),
            response_id: self.response_id.clone(),
            ciphertext: self.ciphertext.clone(),
            nonce: self.nonce.clone(),
            aad_hash: self.aad_hash.clone(),
            enc_dek: self.enc_dek.clone(),
            pmk_fingerprint: self.pmk_fingerprint.clone(),
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for E2eeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("E2eeResponse")
            .field("scale_id", &self.scale_id)
            .field("response_id", &self.response_id)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("enc_dek", &self.enc_dek.len())
            .field("pmk_fingerprint", &self.pmk_fingerprint)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// An encrypted response as released to researchers or the participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedResponse {
    /// Scale the response was submitted to
    pub scale_id: String,
    /// Response identifier
    pub response_id: String,
    /// Opaque AEAD ciphertext
    pub ciphertext: String,
    /// Opaque AEAD nonce
    pub nonce: String,
    /// Hash of the associated data
    pub aad_hash: String,
    /// Wrapped DEKs, oldest first
    pub enc_dek: Vec<String>,
    /// Fingerprint of the original wrapping key
    pub pmk_fingerprint: String,
    /// Unix seconds
    pub created_at: u64,
}

/// A short-lived export job. `(id, token)` behaves like a capability URL.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJob {
    /// Externally visible handle
    pub id: String,
    /// Tenant that requested the job
    pub tenant_id: String,
    /// Scale to export
    pub scale_id: String,
    /// Secret required to redeem the job
    pub token: String,
    /// Client address the job was requested from
    pub request_ip: String,
    /// Unix seconds
    pub created_at: u64,
    /// Unix seconds; the job is unusable from this instant on
    pub expires_at: u64,
}

impl ExportJob {
    /// Whether the job can no longer be redeemed at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for ExportJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportJob")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("scale_id", &self.scale_id)
            .field("token", &"<redacted>")
            .field("request_ip", &self.request_ip)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// State-changing operations recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A project key was registered
    ProjectKeyAdd,
    /// A project key was retired
    ProjectKeyDisable,
    /// A new export job was issued
    ExportE2eeRequest,
    /// A recent export job was handed out again
    ExportE2eeReuse,
    /// An export bundle was released
    ExportE2eeDownload,
    /// Rewrapped DEKs were appended
    RewrapSubmit,
    /// A participant deleted their own response
    E2eeSelfDelete,
}

impl AuditAction {
    /// Wire name, e.g. `export_e2ee_request`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProjectKeyAdd => "project_key_add",
            Self::ProjectKeyDisable => "project_key_disable",
            Self::ExportE2eeRequest => "export_e2ee_request",
            Self::ExportE2eeReuse => "export_e2ee_reuse",
            Self::ExportE2eeDownload => "export_e2ee_download",
            Self::RewrapSubmit => "rewrap_submit",
            Self::E2eeSelfDelete => "e2ee_self_delete",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unix seconds
    pub time: u64,
    /// Who acted
    pub actor: String,
    /// What they did
    pub action: AuditAction,
    /// What they did it to, e.g. `scale:S1`
    pub target: String,
    /// Free-form detail; never ciphertext, tokens or manifests
    pub note: String,
}

/// An authenticated caller, as established by the layer in front of the
/// vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Tenant the caller acts for
    pub tenant_id: String,
    /// Caller identity recorded in the audit log
    pub actor: String,
    /// Whether the caller recently re-authenticated
    pub step_up: bool,
}

impl Principal {
    /// A caller without a fresh step-up signal.
    pub fn new(tenant_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self { tenant_id: tenant_id.into(), actor: actor.into(), step_up: false }
    }

    /// Same caller, marked as freshly re-authenticated.
    #[must_use]
    pub fn with_step_up(mut self) -> Self {
        self.step_up = true;
        self
    }
}
