//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations so tests can check that
//! back-end failures surface as `VaultError::Storage` and never leave a
//! half-applied change or a misleading domain error.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use sealform_core::{
    AuditEntry, AuditLog, E2eeResponse, KeyStore, ProjectKey, ResponseStore, Scale, ScaleStore,
    Storage, StorageError,
};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but fails each
/// operation with probability `failure_rate`. A failed operation never
/// reaches the inner storage. Clone shares the RNG and counter.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Operations attempted, failed or not
    operation_count: Arc<Mutex<usize>>,
}

/// Linear congruential generator, so chaos runs are reproducible per seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Create a new chaotic storage wrapper with a fixed default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.operation_count.lock().expect("operation_count mutex poisoned")
    }

    /// Count the operation, then decide whether it fails.
    #[allow(clippy::expect_used)]
    fn gate(&self) -> Result<(), StorageError> {
        *self.operation_count.lock().expect("operation_count mutex poisoned") += 1;

        let fail =
            self.rng.lock().expect("ChaoticRng mutex poisoned").should_fail(self.failure_rate);

        if fail {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: Storage> ScaleStore for ChaoticStorage<S> {
    fn get_scale(&self, scale_id: &str) -> Result<Option<Scale>, StorageError> {
        self.gate()?;
        self.inner.get_scale(scale_id)
    }

    fn put_scale(&self, scale: &Scale) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.put_scale(scale)
    }
}

impl<S: Storage> KeyStore for ChaoticStorage<S> {
    fn add_project_key(&self, key: &ProjectKey) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.add_project_key(key)
    }

    fn list_project_keys(&self, scale_id: &str) -> Result<Vec<ProjectKey>, StorageError> {
        self.gate()?;
        self.inner.list_project_keys(scale_id)
    }

    fn disable_project_key(
        &self,
        scale_id: &str,
        fingerprint: &str,
    ) -> Result<bool, StorageError> {
        self.gate()?;
        self.inner.disable_project_key(scale_id, fingerprint)
    }
}

impl<S: Storage> ResponseStore for ChaoticStorage<S> {
    fn add_e2ee_response(&self, response: &E2eeResponse) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.add_e2ee_response(response)
    }

    fn list_e2ee_responses(&self, scale_id: &str) -> Result<Vec<E2eeResponse>, StorageError> {
        self.gate()?;
        self.inner.list_e2ee_responses(scale_id)
    }

    fn append_e2ee_enc_dek(
        &self,
        response_id: &str,
        wrapped_dek: &str,
    ) -> Result<bool, StorageError> {
        self.gate()?;
        self.inner.append_e2ee_enc_dek(response_id, wrapped_dek)
    }

    fn get_e2ee_response(&self, response_id: &str) -> Result<Option<E2eeResponse>, StorageError> {
        self.gate()?;
        self.inner.get_e2ee_response(response_id)
    }

    fn delete_e2ee_response(&self, response_id: &str) -> Result<bool, StorageError> {
        self.gate()?;
        self.inner.delete_e2ee_response(response_id)
    }
}

impl<S: Storage> AuditLog for ChaoticStorage<S> {
    fn add_audit(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.add_audit(entry)
    }

    fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StorageError> {
        self.gate()?;
        self.inner.list_audit(limit)
    }
}
