//! Storage back-ends for the server.
//!
//! The traits and the in-memory store live in `sealform_core::storage`; this
//! module adds the durable redb store and the fault-injecting wrapper.

mod chaotic;
mod redb;

pub use chaotic::ChaoticStorage;
pub use sealform_core::storage::{
    AuditLog, KeyStore, MemoryStorage, ResponseStore, ScaleStore, Storage, StorageError,
};

pub use self::redb::RedbStorage;
