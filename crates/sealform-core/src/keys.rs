//! Key Registry
//!
//! Project public keys per scale. Participants encrypt new submissions to the
//! active key; administrators rotate by registering a new key, rewrapping,
//! and finally disabling the old key by hand. Keys are never deleted.

use tracing::info;

use crate::{
    access::{owned_scale, scale_target},
    audit,
    env::Environment,
    error::VaultError,
    model::{AuditAction, NewProjectKey, Principal, ProjectKey},
    storage::{KeyStore, Storage, StorageError},
};

/// Registers, lists and retires project keys.
#[derive(Clone)]
pub struct KeyRegistry<E, S> {
    env: E,
    storage: S,
}

impl<E: Environment, S: Storage> KeyRegistry<E, S> {
    /// Create a registry over `storage`.
    pub fn new(env: E, storage: S) -> Self {
        Self { env, storage }
    }

    /// Register a new key for a scale the caller's tenant owns.
    ///
    /// Prior keys stay active; retiring them is a separate call.
    pub fn add_project_key(
        &self,
        principal: &Principal,
        scale_id: &str,
        key: NewProjectKey,
    ) -> Result<ProjectKey, VaultError> {
        owned_scale(&self.storage, principal, scale_id)?;

        for (field, value) in [
            ("algorithm", &key.algorithm),
            ("kdf", &key.kdf),
            ("public_key", &key.public_key),
            ("fingerprint", &key.fingerprint),
        ] {
            if value.trim().is_empty() {
                return Err(VaultError::invalid(format!("{field} is required")));
            }
        }

        let stored = ProjectKey {
            scale_id: scale_id.to_string(),
            algorithm: key.algorithm,
            kdf: key.kdf,
            public_key: key.public_key,
            fingerprint: key.fingerprint,
            created_at: self.env.wall_clock_secs(),
            disabled: false,
        };

        self.storage.add_project_key(&stored).map_err(|e| match e {
            StorageError::Duplicate { .. } => {
                VaultError::invalid("fingerprint already registered for this scale")
            },
            other => other.into(),
        })?;

        info!(scale = %scale_id, fingerprint = %stored.fingerprint, "project key added");
        audit::record_after_commit(
            &self.env,
            &self.storage,
            &principal.actor,
            AuditAction::ProjectKeyAdd,
            scale_target(scale_id),
            format!("fp={}", stored.fingerprint),
        );

        Ok(stored)
    }

    /// All keys of a scale, active and disabled, in registration order.
    pub fn list_project_keys(&self, scale_id: &str) -> Result<Vec<ProjectKey>, VaultError> {
        if self.storage.get_scale(scale_id)?.is_none() {
            return Err(VaultError::NotFound("scale"));
        }
        Ok(self.storage.list_project_keys(scale_id)?)
    }

    /// Retire a key. Responses wrapped under it are untouched.
    pub fn disable_project_key(
        &self,
        principal: &Principal,
        scale_id: &str,
        fingerprint: &str,
    ) -> Result<(), VaultError> {
        owned_scale(&self.storage, principal, scale_id)?;

        if !self.storage.disable_project_key(scale_id, fingerprint)? {
            return Err(VaultError::NotFound("project key"));
        }

        info!(scale = %scale_id, %fingerprint, "project key disabled");
        audit::record_after_commit(
            &self.env,
            &self.storage,
            &principal.actor,
            AuditAction::ProjectKeyDisable,
            scale_target(scale_id),
            format!("fp={fingerprint}"),
        );

        Ok(())
    }

    /// Newest key that is not disabled.
    pub fn active_project_key(&self, scale_id: &str) -> Result<Option<ProjectKey>, VaultError> {
        Ok(active_key(&self.storage, scale_id)?)
    }
}

/// Newest non-disabled key of a scale.
pub(crate) fn active_key<S: KeyStore>(
    storage: &S,
    scale_id: &str,
) -> Result<Option<ProjectKey>, StorageError> {
    Ok(storage.list_project_keys(scale_id)?.into_iter().rev().find(|k| !k.disabled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::testing::ManualEnv,
        model::Scale,
        storage::{AuditLog, MemoryStorage, ScaleStore},
    };

    fn setup() -> KeyRegistry<ManualEnv, MemoryStorage> {
        let storage = MemoryStorage::new();
        storage
            .put_scale(&Scale {
                id: "S1".into(),
                tenant_id: "T1".into(),
                name: "Wellbeing".into(),
                turnstile_enabled: false,
            })
            .unwrap();
        KeyRegistry::new(ManualEnv::at(1_000), storage)
    }

    fn new_key(fingerprint: &str) -> NewProjectKey {
        NewProjectKey {
            algorithm: "X25519".into(),
            kdf: "HKDF-SHA256".into(),
            public_key: format!("pk-{fingerprint}"),
            fingerprint: fingerprint.into(),
        }
    }

    #[test]
    fn add_and_list() {
        let registry = setup();
        let admin = Principal::new("T1", "admin@t1");

        let key = registry.add_project_key(&admin, "S1", new_key("fp1")).unwrap();
        assert_eq!(key.created_at, 1_000);
        assert!(!key.disabled);

        registry.add_project_key(&admin, "S1", new_key("fp2")).unwrap();
        let keys = registry.list_project_keys("S1").unwrap();
        assert_eq!(keys.iter().map(|k| k.fingerprint.as_str()).collect::<Vec<_>>(), ["fp1", "fp2"]);
        assert!(keys.iter().all(|k| !k.disabled));

        let audit = registry.storage.list_audit(10).unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].action, AuditAction::ProjectKeyAdd);
        assert_eq!(audit[0].target, "scale:S1");
    }

    #[test]
    fn foreign_or_missing_scale_is_forbidden() {
        let registry = setup();

        let other = Principal::new("T2", "mallory");
        assert_eq!(
            registry.add_project_key(&other, "S1", new_key("fp1")),
            Err(VaultError::Forbidden)
        );

        let admin = Principal::new("T1", "admin");
        assert_eq!(
            registry.add_project_key(&admin, "nope", new_key("fp1")),
            Err(VaultError::Forbidden)
        );
    }

    #[test]
    fn blank_fields_and_duplicates_are_invalid() {
        let registry = setup();
        let admin = Principal::new("T1", "admin");

        let mut key = new_key("fp1");
        key.public_key = "  ".into();
        assert!(matches!(
            registry.add_project_key(&admin, "S1", key),
            Err(VaultError::Invalid(msg)) if msg.contains("public_key")
        ));

        registry.add_project_key(&admin, "S1", new_key("fp1")).unwrap();
        assert!(matches!(
            registry.add_project_key(&admin, "S1", new_key("fp1")),
            Err(VaultError::Invalid(_))
        ));
    }

    #[test]
    fn disable_keeps_key_and_moves_active() {
        let registry = setup();
        let admin = Principal::new("T1", "admin");
        registry.add_project_key(&admin, "S1", new_key("fp1")).unwrap();
        registry.add_project_key(&admin, "S1", new_key("fp2")).unwrap();

        assert_eq!(registry.active_project_key("S1").unwrap().unwrap().fingerprint, "fp2");

        registry.disable_project_key(&admin, "S1", "fp2").unwrap();
        assert_eq!(registry.active_project_key("S1").unwrap().unwrap().fingerprint, "fp1");
        assert_eq!(registry.list_project_keys("S1").unwrap().len(), 2);

        assert_eq!(
            registry.disable_project_key(&admin, "S1", "missing"),
            Err(VaultError::NotFound("project key"))
        );
    }

    #[test]
    fn list_unknown_scale_is_not_found() {
        let registry = setup();
        assert_eq!(registry.list_project_keys("nope"), Err(VaultError::NotFound("scale")));
    }
}
