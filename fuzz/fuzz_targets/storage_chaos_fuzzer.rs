//! Fuzz target for the vault under storage failures
//!
//! # Strategy
//!
//! - Variable failure rates (0% to 90%) with a fuzzer-chosen chaos seed
//! - Operations that always succeed on healthy storage
//!
//! # Invariants
//!
//! - NEVER panic on storage errors
//! - Storage failures surface as `VaultError::Storage`, never as a domain
//!   error such as `Forbidden` or `NotFound`
//! - Only successful intakes leave a stored response

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealform_core::{
    DownloadAuth, MemoryStorage, Principal, RewrapSubmission, Vault, VaultConfig, VaultError,
};
use sealform_harness::{
    SimEnv,
    fixtures::{intake_request, new_key, seed_scale},
};
use sealform_server::ChaoticStorage;

#[derive(Debug, Arbitrary)]
struct ChaosScenario {
    chaos_seed: u64,
    /// 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    operations: Vec<ChaosOperation>,
}

#[derive(Debug, Arbitrary)]
enum ChaosOperation {
    Intake,
    Rewrap { pick: u8 },
    SelfExport { pick: u8 },
    StepUpDownload,
    ListKeys,
}

fn storage_only<T>(result: &Result<T, VaultError>) {
    if let Err(err) = result {
        assert!(matches!(err, VaultError::Storage(_)), "domain error under chaos: {err}");
    }
}

fuzz_target!(|scenario: ChaosScenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;

    let inner = MemoryStorage::new();
    seed_scale(&inner, "S1", "T1", false).expect("memory storage");
    let admin = Principal::new("T1", "admin");

    let healthy = Vault::new(SimEnv::new(), inner.clone(), VaultConfig::default());
    healthy.add_project_key(&admin, "S1", new_key("fp1")).expect("healthy storage");

    let chaotic = ChaoticStorage::with_seed(inner.clone(), failure_rate, scenario.chaos_seed);
    let vault = Vault::new(SimEnv::with_seed(scenario.chaos_seed), chaotic, VaultConfig::default());

    let mut receipts = Vec::new();
    for op in scenario.operations.into_iter().take(64) {
        match op {
            ChaosOperation::Intake => {
                let result = vault.intake(intake_request("S1"), None);
                storage_only(&result);
                if let Ok(receipt) = result {
                    receipts.push(receipt);
                }
            },
            ChaosOperation::Rewrap { pick } => {
                let Some(receipt) = receipts.get(usize::from(pick) % receipts.len().max(1)) else {
                    continue;
                };
                let items = [RewrapSubmission {
                    response_id: receipt.response_id.clone(),
                    enc_dek: format!("W{pick}"),
                }];
                storage_only(&vault.submit_rewrap(&admin, "S1", &items, "fp1"));
            },
            ChaosOperation::SelfExport { pick } => {
                let Some(receipt) = receipts.get(usize::from(pick) % receipts.len().max(1)) else {
                    continue;
                };
                storage_only(&vault.self_export(&receipt.response_id, &receipt.self_token));
            },
            ChaosOperation::StepUpDownload => {
                let auth = DownloadAuth::StepUp { scale_id: "S1".into() };
                storage_only(&vault.download_export(&admin.clone().with_step_up(), &auth));
            },
            ChaosOperation::ListKeys => storage_only(&vault.list_project_keys("S1")),
        }
    }

    assert_eq!(inner.response_count(), receipts.len());
});
