#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::{AuditLog, KeyStore, ResponseStore, ScaleStore, StorageError};
use crate::model::{AuditEntry, E2eeResponse, ProjectKey, Scale};

/// In-memory storage implementation for tests, simulation and ephemeral
/// deployments.
///
/// Uses `HashMap` for lookups and `Vec` for ordered per-scale lists. All state
/// is wrapped in `Arc<Mutex<>>` to allow Clone and concurrent access. A
/// poisoned lock surfaces as `StorageError::Io`.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    scales: HashMap<String, Scale>,

    /// Keys per scale, insertion order
    keys: HashMap<String, Vec<ProjectKey>>,

    responses: HashMap<String, E2eeResponse>,

    /// Response ids per scale, submission order
    scale_responses: HashMap<String, Vec<String>>,

    audit: Vec<AuditEntry>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(MemoryStorageInner::default())) }
    }

    /// Total number of stored responses across all scales.
    ///
    /// Useful for debugging and testing. Reads through a poisoned lock.
    pub fn response_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).responses.len()
    }

    /// Number of audit entries. Reads through a poisoned lock.
    pub fn audit_len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).audit.len()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStorageInner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Io("memory storage lock poisoned".into()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ScaleStore for MemoryStorage {
    fn get_scale(&self, scale_id: &str) -> Result<Option<Scale>, StorageError> {
        Ok(self.lock()?.scales.get(scale_id).cloned())
    }

    fn put_scale(&self, scale: &Scale) -> Result<(), StorageError> {
        self.lock()?.scales.insert(scale.id.clone(), scale.clone());
        Ok(())
    }
}

impl KeyStore for MemoryStorage {
    fn add_project_key(&self, key: &ProjectKey) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let keys = inner.keys.entry(key.scale_id.clone()).or_default();

        if keys.iter().any(|k| k.fingerprint == key.fingerprint) {
            return Err(StorageError::Duplicate {
                kind: "project key",
                id: key.fingerprint.clone(),
            });
        }

        keys.push(key.clone());
        Ok(())
    }

    fn list_project_keys(&self, scale_id: &str) -> Result<Vec<ProjectKey>, StorageError> {
        let inner = self.lock()?;
        Ok(inner.keys.get(scale_id).cloned().unwrap_or_default())
    }

    fn disable_project_key(
        &self,
        scale_id: &str,
        fingerprint: &str,
    ) -> Result<bool, StorageError> {
        let mut inner = self.lock()?;

        let key = inner
            .keys
            .get_mut(scale_id)
            .and_then(|keys| keys.iter_mut().find(|k| k.fingerprint == fingerprint));

        Ok(match key {
            Some(key) => {
                key.disabled = true;
                true
            },
            None => false,
        })
    }
}

impl ResponseStore for MemoryStorage {
    fn add_e2ee_response(&self, response: &E2eeResponse) -> Result<(), StorageError> {
        let mut inner = self.lock()?;

        if inner.responses.contains_key(&response.response_id) {
            return Err(StorageError::Duplicate {
                kind: "response",
                id: response.response_id.clone(),
            });
        }

        inner.responses.insert(response.response_id.clone(), response.clone());
        inner
            .scale_responses
            .entry(response.scale_id.clone())
            .or_default()
            .push(response.response_id.clone());

        Ok(())
    }

    fn list_e2ee_responses(&self, scale_id: &str) -> Result<Vec<E2eeResponse>, StorageError> {
        let inner = self.lock()?;

        let Some(ids) = inner.scale_responses.get(scale_id) else {
            return Ok(Vec::new());
        };

        Ok(ids.iter().filter_map(|id| inner.responses.get(id).cloned()).collect())
    }

    fn append_e2ee_enc_dek(
        &self,
        response_id: &str,
        wrapped_dek: &str,
    ) -> Result<bool, StorageError> {
        let mut inner = self.lock()?;

        let Some(response) = inner.responses.get_mut(response_id) else {
            return Ok(false);
        };

        if !response.enc_dek.iter().any(|existing| existing == wrapped_dek) {
            response.enc_dek.push(wrapped_dek.to_string());
        }

        Ok(true)
    }

    fn get_e2ee_response(&self, response_id: &str) -> Result<Option<E2eeResponse>, StorageError> {
        Ok(self.lock()?.responses.get(response_id).cloned())
    }

    fn delete_e2ee_response(&self, response_id: &str) -> Result<bool, StorageError> {
        let mut inner = self.lock()?;

        let Some(removed) = inner.responses.remove(response_id) else {
            return Ok(false);
        };

        if let Some(ids) = inner.scale_responses.get_mut(&removed.scale_id) {
            ids.retain(|id| id != response_id);
        }

        Ok(true)
    }
}

impl AuditLog for MemoryStorage {
    fn add_audit(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        self.lock()?.audit.push(entry.clone());
        Ok(())
    }

    fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StorageError> {
        let inner = self.lock()?;
        let start = inner.audit.len().saturating_sub(limit);
        Ok(inner.audit[start..].to_vec())
    }
}
