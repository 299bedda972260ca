//! Fuzz target for participant submissions
//!
//! Intake is the only unauthenticated write path, so it sees the most
//! hostile input.
//!
//! # Strategy
//!
//! - Raw bytes: arbitrary JSON-ish bodies through the same deserializer the
//!   HTTP layer uses
//! - Structured: well-formed requests with arbitrary field contents,
//!   unknown scales, blank entries and oversized ciphertext
//!
//! # Invariants
//!
//! - NEVER panic, whatever the body
//! - A rejected submission stores nothing
//! - An accepted submission is stored exactly as sent, under the returned id,
//!   with a self token that redeems it

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealform_core::{
    IntakeLimits, IntakeRequest, MemoryStorage, ResponseStore, Vault, VaultConfig,
};
use sealform_harness::{SimEnv, fixtures::seed_scale};

#[derive(Debug, Arbitrary)]
enum Submission {
    Raw(Vec<u8>),
    Structured {
        scale_pick: u8,
        response_id: Option<String>,
        ciphertext: String,
        nonce: String,
        aad_hash: String,
        enc_dek: Vec<String>,
        pmk_fingerprint: Option<String>,
    },
}

fuzz_target!(|input: (u64, Submission)| {
    let (seed, submission) = input;

    let storage = MemoryStorage::new();
    seed_scale(&storage, "S1", "T1", false).expect("memory storage");
    let config = VaultConfig {
        intake: IntakeLimits { max_ciphertext_len: 4096, max_enc_dek: 4 },
        ..VaultConfig::default()
    };
    let vault = Vault::new(SimEnv::with_seed(seed), storage.clone(), config);

    let request = match submission {
        Submission::Raw(bytes) => match serde_json::from_slice::<IntakeRequest>(&bytes) {
            Ok(request) => request,
            Err(_) => return,
        },
        Submission::Structured {
            scale_pick,
            response_id,
            ciphertext,
            nonce,
            aad_hash,
            enc_dek,
            pmk_fingerprint,
        } => IntakeRequest {
            scale_id: if scale_pick % 4 == 0 { "missing".into() } else { "S1".into() },
            response_id,
            ciphertext,
            nonce,
            aad_hash,
            enc_dek,
            pmk_fingerprint,
            turnstile_token: None,
        },
    };

    match vault.intake(request.clone(), None) {
        Ok(receipt) => {
            assert!(!receipt.self_token.is_empty());
            assert_eq!(storage.response_count(), 1);

            let stored = storage
                .get_e2ee_response(&receipt.response_id)
                .expect("memory storage")
                .expect("accepted response is stored");
            assert_eq!(stored.ciphertext, request.ciphertext);
            assert_eq!(stored.nonce, request.nonce);
            assert_eq!(stored.enc_dek, request.enc_dek);

            let own = vault
                .self_export(&receipt.response_id, &receipt.self_token)
                .expect("self token redeems");
            assert_eq!(own.response_id, receipt.response_id);
        },
        Err(_) => assert_eq!(storage.response_count(), 0),
    }
});
