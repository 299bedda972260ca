//! Deterministic test harness for sealform.
//!
//! [`SimEnv`] implements the core `Environment` with a manual clock and a
//! seeded RNG, so token minting, job expiry and throttling replay exactly.
//! The `collaborators` module provides scripted Turnstile verifiers, manifest
//! signers and a call-counting throttle for asserting how the vault uses its
//! collaborators.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod collaborators;
pub mod fixtures;
pub mod sim_env;

pub use collaborators::{CountingThrottle, FailingSigner, RecordingSigner, StaticVerifier};
pub use sim_env::SimEnv;
