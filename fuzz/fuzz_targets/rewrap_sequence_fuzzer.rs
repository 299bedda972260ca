//! Fuzz target for key rotation sequences
//!
//! # Strategy
//!
//! - Interleave key registration, key disabling, submissions and rewrap
//!   batches in arbitrary order
//! - Batches mix known and unknown response ids and blank DEKs
//!
//! # Invariants
//!
//! - NEVER panic
//! - `enc_dek` never shrinks and its existing prefix never changes
//! - A rejected batch changes no response

#![no_main]

use std::collections::HashMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealform_core::{
    MemoryStorage, Principal, ResponseStore, RewrapSubmission, Vault, VaultConfig,
};
use sealform_harness::{
    SimEnv,
    fixtures::{intake_request, new_key, seed_scale},
};

const FINGERPRINTS: [&str; 4] = ["fp0", "fp1", "fp2", "fp3"];

#[derive(Debug, Arbitrary)]
enum Step {
    AddKey { fp: u8 },
    DisableKey { fp: u8 },
    Submit,
    Rewrap { to_fp: u8, items: Vec<(u8, bool, String)> },
}

fuzz_target!(|input: (u64, Vec<Step>)| {
    let (seed, steps) = input;

    let storage = MemoryStorage::new();
    seed_scale(&storage, "S1", "T1", false).expect("memory storage");
    let vault = Vault::new(SimEnv::with_seed(seed), storage.clone(), VaultConfig::default());
    let admin = Principal::new("T1", "admin");

    let mut ids: Vec<String> = Vec::new();

    for step in steps.into_iter().take(64) {
        let before: HashMap<String, Vec<String>> = ids
            .iter()
            .map(|id| {
                let stored = storage.get_e2ee_response(id).expect("memory storage");
                (id.clone(), stored.expect("never deleted").enc_dek)
            })
            .collect();

        match step {
            Step::AddKey { fp } => {
                let fp = FINGERPRINTS[usize::from(fp) % FINGERPRINTS.len()];
                let _ = vault.add_project_key(&admin, "S1", new_key(fp));
            },
            Step::DisableKey { fp } => {
                let fp = FINGERPRINTS[usize::from(fp) % FINGERPRINTS.len()];
                let _ = vault.disable_project_key(&admin, "S1", fp);
            },
            Step::Submit => {
                let receipt = vault.intake(intake_request("S1"), None).expect("valid intake");
                ids.push(receipt.response_id);
            },
            Step::Rewrap { to_fp, items } => {
                let to_fp = FINGERPRINTS[usize::from(to_fp) % FINGERPRINTS.len()];
                let batch: Vec<_> = items
                    .into_iter()
                    .take(8)
                    .map(|(pick, known, enc_dek)| {
                        let response_id = if known && !ids.is_empty() {
                            ids[usize::from(pick) % ids.len()].clone()
                        } else {
                            format!("ghost-{pick}")
                        };
                        RewrapSubmission { response_id, enc_dek }
                    })
                    .collect();

                if vault.submit_rewrap(&admin, "S1", &batch, to_fp).is_err() {
                    for (id, old) in &before {
                        let now = storage.get_e2ee_response(id).expect("memory storage");
                        assert_eq!(&now.expect("never deleted").enc_dek, old);
                    }
                }
            },
        }

        for (id, old) in &before {
            let now = storage.get_e2ee_response(id).expect("memory storage");
            let now = now.expect("never deleted").enc_dek;
            assert!(now.len() >= old.len());
            assert_eq!(&now[..old.len()], &old[..]);
        }
    }
});
