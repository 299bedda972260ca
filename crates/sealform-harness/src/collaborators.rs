//! Scripted collaborators.
//!
//! Each records how it was called so tests can assert on the vault's use of
//! it, not just on the outcome.

#![allow(clippy::disallowed_types, reason = "Synchronous test doubles")]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use sealform_core::{
    Admission, ExportThrottle, ManifestSigner, MemoryThrottle, SignerError, StorageError,
    TurnstileVerifier, VerifierError,
};

/// Turnstile verifier with a fixed answer.
#[derive(Clone)]
pub struct StaticVerifier {
    answer: Result<bool, VerifierError>,
    seen: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl StaticVerifier {
    /// Accepts every token.
    pub fn passing() -> Self {
        Self::answering(Ok(true))
    }

    /// Rejects every token.
    pub fn rejecting() -> Self {
        Self::answering(Ok(false))
    }

    /// Fails every call with a transport error.
    pub fn unreachable() -> Self {
        Self::answering(Err(VerifierError::Transport("connection refused".into())))
    }

    fn answering(answer: Result<bool, VerifierError>) -> Self {
        Self { answer, seen: Arc::new(Mutex::new(Vec::new())) }
    }

    /// `(token, remote_ip)` of every call, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.seen.lock().expect("Mutex poisoned").clone()
    }
}

impl TurnstileVerifier for StaticVerifier {
    #[allow(clippy::expect_used)]
    fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool, VerifierError> {
        self.seen
            .lock()
            .expect("Mutex poisoned")
            .push((token.to_string(), remote_ip.map(str::to_string)));
        self.answer.clone()
    }
}

/// Signer that returns a predictable signature and keeps every message.
#[derive(Clone, Default)]
pub struct RecordingSigner {
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingSigner {
    /// Create a signer with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signature this signer produces for `message`.
    pub fn signature_for(message: &[u8]) -> String {
        format!("test-sig:{}", message.len())
    }

    /// Every message signed so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.messages.lock().expect("Mutex poisoned").clone()
    }
}

impl ManifestSigner for RecordingSigner {
    #[allow(clippy::expect_used)]
    fn sign(&self, message: &[u8]) -> Result<String, SignerError> {
        self.messages.lock().expect("Mutex poisoned").push(message.to_vec());
        Ok(Self::signature_for(message))
    }
}

/// Signer that always fails.
#[derive(Clone, Copy, Default)]
pub struct FailingSigner;

impl ManifestSigner for FailingSigner {
    fn sign(&self, _message: &[u8]) -> Result<String, SignerError> {
        Err(SignerError("signing key unavailable".into()))
    }
}

/// Throttle wrapper counting how often it is consulted.
#[derive(Clone)]
pub struct CountingThrottle<T = MemoryThrottle> {
    inner: T,
    calls: Arc<AtomicUsize>,
}

impl CountingThrottle {
    /// Count calls to a fresh [`MemoryThrottle`].
    pub fn new() -> Self {
        Self::wrap(MemoryThrottle::new())
    }
}

impl Default for CountingThrottle {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CountingThrottle<T> {
    /// Count calls to `inner`.
    pub fn wrap(inner: T) -> Self {
        Self { inner, calls: Arc::new(AtomicUsize::new(0)) }
    }

    /// Calls so far, across all clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<T: ExportThrottle> ExportThrottle for CountingThrottle<T> {
    fn allow(
        &self,
        tenant_id: &str,
        min_interval: Duration,
        now: u64,
    ) -> Result<Admission, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.allow(tenant_id, min_interval, now)
    }
}
