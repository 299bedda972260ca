//! Storage abstraction for the vault.
//!
//! One narrow trait per component so back-ends can be swapped and wrapped
//! independently. All traits are synchronous (no async) to keep the core
//! Sans-IO; the only blocking work in a vault call is the storage call itself.

mod error;
mod memory;

pub use error::StorageError;
pub use memory::MemoryStorage;

use crate::model::{AuditEntry, E2eeResponse, ProjectKey, Scale};

/// Read access to scales (plus seeding, since scales are authored elsewhere).
pub trait ScaleStore {
    /// Look up a scale. `None` if it does not exist.
    fn get_scale(&self, scale_id: &str) -> Result<Option<Scale>, StorageError>;

    /// Insert or replace a scale record.
    fn put_scale(&self, scale: &Scale) -> Result<(), StorageError>;
}

/// Project key persistence for the key registry.
pub trait KeyStore {
    /// Append a key to its scale's key list.
    ///
    /// # Errors
    ///
    /// `StorageError::Duplicate` if the scale already has a key with the same
    /// fingerprint.
    fn add_project_key(&self, key: &ProjectKey) -> Result<(), StorageError>;

    /// All keys of a scale, active and disabled, in insertion order.
    fn list_project_keys(&self, scale_id: &str) -> Result<Vec<ProjectKey>, StorageError>;

    /// Mark a key disabled. Returns `false` if no such key exists.
    ///
    /// Idempotent: disabling a disabled key returns `true`.
    fn disable_project_key(&self, scale_id: &str, fingerprint: &str)
    -> Result<bool, StorageError>;
}

/// Encrypted response persistence for intake, export and rewrap.
pub trait ResponseStore {
    /// Store a new response.
    ///
    /// # Errors
    ///
    /// `StorageError::Duplicate` if `response_id` is already taken.
    fn add_e2ee_response(&self, response: &E2eeResponse) -> Result<(), StorageError>;

    /// Responses of a scale in submission order.
    fn list_e2ee_responses(&self, scale_id: &str) -> Result<Vec<E2eeResponse>, StorageError>;

    /// Append a wrapped DEK to a response's `enc_dek` list.
    ///
    /// # Invariants
    ///
    /// - Existing entries are never overwritten or reordered
    /// - Appending a value already in the list leaves the list unchanged
    ///
    /// Returns `false` if the response does not exist.
    fn append_e2ee_enc_dek(&self, response_id: &str, wrapped_dek: &str)
    -> Result<bool, StorageError>;

    /// Look up one response. `None` if it does not exist.
    fn get_e2ee_response(&self, response_id: &str) -> Result<Option<E2eeResponse>, StorageError>;

    /// Delete one response. Returns `false` if it did not exist.
    fn delete_e2ee_response(&self, response_id: &str) -> Result<bool, StorageError>;
}

/// Append-only audit trail.
pub trait AuditLog {
    /// Append an entry.
    fn add_audit(&self, entry: &AuditEntry) -> Result<(), StorageError>;

    /// The most recent `limit` entries, oldest first.
    fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StorageError>;
}

/// Everything the vault needs from persistence.
///
/// Must be Clone (shared by every component), Send + Sync (vault calls run
/// on blocking worker threads), and synchronous. Implementations typically
/// share internal state via Arc, so clones access the same underlying store.
pub trait Storage:
    ScaleStore + KeyStore + ResponseStore + AuditLog + Clone + Send + Sync + 'static
{
}

impl<T> Storage for T where
    T: ScaleStore + KeyStore + ResponseStore + AuditLog + Clone + Send + Sync + 'static
{
}
