//! Record builders shared by integration tests.

use sealform_core::{IntakeRequest, NewProjectKey, Scale, ScaleStore, StorageError};

/// A scale owned by `tenant_id`.
pub fn scale(id: &str, tenant_id: &str, turnstile_enabled: bool) -> Scale {
    Scale {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        name: format!("scale {id}"),
        turnstile_enabled,
    }
}

/// Store a scale owned by `tenant_id`.
pub fn seed_scale<S: ScaleStore>(
    storage: &S,
    id: &str,
    tenant_id: &str,
    turnstile_enabled: bool,
) -> Result<(), StorageError> {
    storage.put_scale(&scale(id, tenant_id, turnstile_enabled))
}

/// Key material with the given fingerprint.
pub fn new_key(fingerprint: &str) -> NewProjectKey {
    NewProjectKey {
        algorithm: "X25519+XChaCha20-Poly1305".to_string(),
        kdf: "HKDF-SHA256".to_string(),
        public_key: format!("pk-{fingerprint}"),
        fingerprint: fingerprint.to_string(),
    }
}

/// Smallest valid submission to `scale_id`.
pub fn intake_request(scale_id: &str) -> IntakeRequest {
    IntakeRequest {
        scale_id: scale_id.to_string(),
        ciphertext: "C".to_string(),
        nonce: "N".to_string(),
        enc_dek: vec!["D".to_string()],
        ..IntakeRequest::default()
    }
}
