//! Sealform core.
//!
//! Server-side orchestration for end-to-end encrypted survey responses. The
//! server never sees plaintext: clients encrypt each response under a fresh
//! data-encryption-key (DEK), wrap the DEK under the project's public key, and
//! submit ciphertext plus wrapped DEKs. This crate decides who may submit,
//! fetch and re-wrap that material, and when.
//!
//! # Architecture
//!
//! Everything here is synchronous and free of I/O. Time and randomness come
//! from an [`Environment`], persistence from the narrow traits in [`storage`],
//! and the bot check and manifest signing from the collaborator traits in
//! [`collaborators`]. Production glue (HTTP, redb, system clock) lives in
//! `sealform-server`.
//!
//! # Components
//!
//! - [`KeyRegistry`]: project public keys per scale, identified by fingerprint
//! - [`IntakePipeline`]: validates and persists encrypted submissions
//! - [`ExportIssuer`]: throttled, idempotent export job issuance and redemption
//! - [`BundleBuilder`]: signed manifest plus ciphertext for a download
//! - [`RewrapCoordinator`]: append-only key rotation
//! - [`Vault`]: the facade wiring the five together

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod access;
pub mod audit;
pub mod bundle;
pub mod capability;
pub mod collaborators;
pub mod env;
pub mod error;
pub mod export;
pub mod intake;
pub mod keys;
pub mod model;
pub mod rewrap;
pub mod storage;
mod vault;

pub use bundle::{
    BundleBuilder, DownloadAuth, ExportBundle, MANIFEST_TYPE, MANIFEST_VERSION, Manifest,
};
pub use collaborators::{ManifestSigner, SignerError, TurnstileVerifier, VerifierError};
pub use env::Environment;
pub use error::VaultError;
pub use export::{
    Admission, ExportIssuer, ExportJobStore, ExportPolicy, ExportThrottle, ExportTicket,
    MemoryJobStore, MemoryThrottle,
};
pub use intake::{IntakeLimits, IntakePipeline, IntakeReceipt, IntakeRequest};
pub use keys::KeyRegistry;
pub use model::{
    AuditAction, AuditEntry, E2eeResponse, ExportJob, ExportedResponse, NewProjectKey, Principal,
    ProjectKey, Scale,
};
pub use rewrap::{RewrapCoordinator, RewrapItem, RewrapListing, RewrapSubmission};
pub use storage::{
    AuditLog, KeyStore, MemoryStorage, ResponseStore, ScaleStore, Storage, StorageError,
};
pub use vault::{Vault, VaultConfig};
