//! Rewrap Coordinator
//!
//! Key rotation without touching ciphertext. The admin's client fetches every
//! response's wrapped DEKs, unwraps them with the old private key, wraps them
//! under the new public key, and submits the results. The server only ever
//! appends: a response's `enc_dek` list never loses or reorders an entry, so
//! responses stay readable under the old key until it is retired.
//!
//! # At-least-once
//!
//! `submit` checks every item before the first append. An append can still
//! fail midway (storage error, or the response deleted concurrently); items
//! appended before that stay applied. Re-running the rotation is safe since
//! appending a DEK already present is a no-op.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    access::{owned_scale, scale_target},
    audit,
    env::Environment,
    error::VaultError,
    model::{AuditAction, Principal},
    storage::Storage,
};

/// One response and its current wrapped DEKs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewrapItem {
    /// Response identifier
    pub response_id: String,
    /// Wrapped DEKs, oldest first
    pub enc_dek: Vec<String>,
}

/// Everything a client needs to rewrap a scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewrapListing {
    /// Fingerprint being rotated away from, echoed back
    pub from_fp: String,
    /// Fingerprint being rotated to, echoed back
    pub to_fp: String,
    /// Every response of the scale
    pub items: Vec<RewrapItem>,
}

/// A DEK wrapped under the new key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewrapSubmission {
    /// Response the DEK belongs to
    pub response_id: String,
    /// DEK wrapped under `to_fp`
    pub enc_dek: String,
}

/// Lists and applies rewraps.
#[derive(Clone)]
pub struct RewrapCoordinator<E, S> {
    env: E,
    storage: S,
}

impl<E: Environment, S: Storage> RewrapCoordinator<E, S> {
    /// Create a coordinator over `storage`.
    pub fn new(env: E, storage: S) -> Self {
        Self { env, storage }
    }

    /// All responses of an owned scale with their full `enc_dek` lists.
    pub fn list_items(
        &self,
        principal: &Principal,
        scale_id: &str,
        from_fp: &str,
        to_fp: &str,
    ) -> Result<RewrapListing, VaultError> {
        owned_scale(&self.storage, principal, scale_id)?;

        let items = self
            .storage
            .list_e2ee_responses(scale_id)?
            .into_iter()
            .map(|r| RewrapItem { response_id: r.response_id, enc_dek: r.enc_dek })
            .collect();

        Ok(RewrapListing { from_fp: from_fp.to_string(), to_fp: to_fp.to_string(), items })
    }

    /// Append rewrapped DEKs. Returns the number of items applied.
    pub fn submit(
        &self,
        principal: &Principal,
        scale_id: &str,
        items: &[RewrapSubmission],
        to_fp: &str,
    ) -> Result<usize, VaultError> {
        owned_scale(&self.storage, principal, scale_id)?;

        if items.is_empty() {
            return Err(VaultError::invalid("items must not be empty"));
        }
        if to_fp.trim().is_empty() {
            return Err(VaultError::invalid("to_fp is required"));
        }
        if items.iter().any(|item| item.enc_dek.trim().is_empty()) {
            return Err(VaultError::invalid("enc_dek entries must not be blank"));
        }

        let target_registered = self
            .storage
            .list_project_keys(scale_id)?
            .iter()
            .any(|k| k.fingerprint == to_fp && !k.disabled);
        if !target_registered {
            return Err(VaultError::invalid("to_fp is not an active key of this scale"));
        }

        for item in items {
            match self.storage.get_e2ee_response(&item.response_id)? {
                Some(response) if response.scale_id == scale_id => {},
                _ => {
                    warn!(
                        scale = %scale_id,
                        response = %item.response_id,
                        "rewrap for unknown response"
                    );
                    return Err(VaultError::NotFound("response"));
                },
            }
        }

        for (applied, item) in items.iter().enumerate() {
            if !self.storage.append_e2ee_enc_dek(&item.response_id, &item.enc_dek)? {
                warn!(
                    scale = %scale_id,
                    response = %item.response_id,
                    applied,
                    "response vanished during rewrap"
                );
                return Err(VaultError::NotFound("response"));
            }
        }

        info!(scale = %scale_id, to = %to_fp, items = items.len(), "rewrap applied");
        audit::record_after_commit(
            &self.env,
            &self.storage,
            &principal.actor,
            AuditAction::RewrapSubmit,
            scale_target(scale_id),
            format!("to={to_fp} items={}", items.len()),
        );

        Ok(items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::testing::ManualEnv,
        model::{E2eeResponse, ProjectKey, Scale},
        storage::{AuditLog, KeyStore, MemoryStorage, ResponseStore, ScaleStore},
    };

    fn setup() -> (MemoryStorage, RewrapCoordinator<ManualEnv, MemoryStorage>) {
        let storage = MemoryStorage::new();
        for (scale, tenant) in [("S1", "T1"), ("S2", "T1")] {
            storage
                .put_scale(&Scale {
                    id: scale.into(),
                    tenant_id: tenant.into(),
                    name: String::new(),
                    turnstile_enabled: false,
                })
                .unwrap();
        }
        storage
            .add_project_key(&ProjectKey {
                scale_id: "S1".into(),
                algorithm: "X25519".into(),
                kdf: "HKDF-SHA256".into(),
                public_key: "pk2".into(),
                fingerprint: "fp2".into(),
                created_at: 0,
                disabled: false,
            })
            .unwrap();
        for (scale, id) in [("S1", "r1"), ("S1", "r2"), ("S2", "x1")] {
            storage
                .add_e2ee_response(&E2eeResponse {
                    scale_id: scale.into(),
                    response_id: id.into(),
                    ciphertext: "C".into(),
                    nonce: "N".into(),
                    aad_hash: String::new(),
                    enc_dek: vec![format!("{id}-fp1")],
                    pmk_fingerprint: "fp1".into(),
                    created_at: 0,
                    self_token: "t".into(),
                })
                .unwrap();
        }
        (storage.clone(), RewrapCoordinator::new(ManualEnv::at(7), storage))
    }

    fn item(response_id: &str, enc_dek: &str) -> RewrapSubmission {
        RewrapSubmission { response_id: response_id.into(), enc_dek: enc_dek.into() }
    }

    #[test]
    fn listing_covers_scale_only() {
        let (_, rewrap) = setup();
        let admin = Principal::new("T1", "admin");

        let listing = rewrap.list_items(&admin, "S1", "fp1", "fp2").unwrap();
        assert_eq!(listing.from_fp, "fp1");
        assert_eq!(listing.to_fp, "fp2");
        assert_eq!(
            listing.items,
            vec![
                RewrapItem { response_id: "r1".into(), enc_dek: vec!["r1-fp1".into()] },
                RewrapItem { response_id: "r2".into(), enc_dek: vec!["r2-fp1".into()] },
            ]
        );

        assert_eq!(
            rewrap.list_items(&Principal::new("T2", "x"), "S1", "fp1", "fp2"),
            Err(VaultError::Forbidden)
        );
    }

    #[test]
    fn submit_appends_and_audits() {
        let (storage, rewrap) = setup();
        let admin = Principal::new("T1", "admin");

        let applied = rewrap
            .submit(&admin, "S1", &[item("r1", "r1-fp2"), item("r2", "r2-fp2")], "fp2")
            .unwrap();
        assert_eq!(applied, 2);

        let r1 = storage.get_e2ee_response("r1").unwrap().unwrap();
        assert_eq!(r1.enc_dek, vec!["r1-fp1", "r1-fp2"]);

        let audit = storage.list_audit(1).unwrap();
        assert_eq!(audit[0].action, AuditAction::RewrapSubmit);
        assert_eq!(audit[0].note, "to=fp2 items=2");
    }

    #[test]
    fn unknown_or_foreign_response_rejected_before_any_append() {
        let (storage, rewrap) = setup();
        let admin = Principal::new("T1", "admin");

        assert_eq!(
            rewrap.submit(&admin, "S1", &[item("r1", "r1-fp2"), item("nope", "d")], "fp2"),
            Err(VaultError::NotFound("response"))
        );
        assert_eq!(
            rewrap.submit(&admin, "S1", &[item("x1", "x1-fp2")], "fp2"),
            Err(VaultError::NotFound("response"))
        );

        let r1 = storage.get_e2ee_response("r1").unwrap().unwrap();
        assert_eq!(r1.enc_dek.len(), 1);
        assert_eq!(storage.audit_len(), 0);
    }

    #[test]
    fn invalid_submissions() {
        let (_, rewrap) = setup();
        let admin = Principal::new("T1", "admin");

        assert!(matches!(rewrap.submit(&admin, "S1", &[], "fp2"), Err(VaultError::Invalid(_))));
        assert!(matches!(
            rewrap.submit(&admin, "S1", &[item("r1", "d")], " "),
            Err(VaultError::Invalid(_))
        ));
        assert!(matches!(
            rewrap.submit(&admin, "S1", &[item("r1", "")], "fp2"),
            Err(VaultError::Invalid(_))
        ));
        assert!(matches!(
            rewrap.submit(&admin, "S1", &[item("r1", "d")], "fp-unknown"),
            Err(VaultError::Invalid(_))
        ));
    }

    #[test]
    fn resubmitting_is_a_no_op() {
        let (storage, rewrap) = setup();
        let admin = Principal::new("T1", "admin");
        let items = [item("r1", "r1-fp2")];

        rewrap.submit(&admin, "S1", &items, "fp2").unwrap();
        rewrap.submit(&admin, "S1", &items, "fp2").unwrap();

        let r1 = storage.get_e2ee_response("r1").unwrap().unwrap();
        assert_eq!(r1.enc_dek, vec!["r1-fp1", "r1-fp2"]);
    }
}
