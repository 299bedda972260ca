//! Export bundle downloads through both authorization paths.

use std::{sync::Arc, time::Duration};

use sealform_core::{
    AuditAction, DownloadAuth, Environment, MANIFEST_TYPE, MANIFEST_VERSION, Manifest,
    MemoryStorage, Principal, Vault, VaultConfig, VaultError,
};
use sealform_harness::{
    FailingSigner, RecordingSigner, SimEnv,
    fixtures::{intake_request, seed_scale},
};

fn setup() -> (SimEnv, MemoryStorage, Vault<SimEnv, MemoryStorage>) {
    let env = SimEnv::new();
    let storage = MemoryStorage::new();
    seed_scale(&storage, "S1", "T1", false).unwrap();
    seed_scale(&storage, "S2", "T2", false).unwrap();
    let vault = Vault::new(env.clone(), storage.clone(), VaultConfig::default());

    for _ in 0..3 {
        vault.intake(intake_request("S1"), None).unwrap();
    }
    vault.intake(intake_request("S2"), None).unwrap();

    (env, storage, vault)
}

fn job_auth(url: &str, job_id: &str) -> DownloadAuth {
    let token = url.rsplit("token=").next().unwrap().to_string();
    DownloadAuth::Job { job_id: job_id.to_string(), token }
}

#[test]
fn job_download_releases_scale_ciphertext() {
    let (env, _, vault) = setup();
    let admin = Principal::new("T1", "admin");

    let ticket = vault.request_export(&admin, "S1", "1.2.3.4").unwrap();
    let bundle = vault.download_export(&admin, &job_auth(&ticket.url, &ticket.job_id)).unwrap();

    assert_eq!(
        bundle.manifest,
        Manifest {
            version: MANIFEST_VERSION,
            kind: MANIFEST_TYPE.to_string(),
            scale_id: "S1".into(),
            count: 3,
            created_at: env.wall_clock_secs(),
        }
    );
    assert_eq!(bundle.responses.len(), 3);
    assert!(bundle.responses.iter().all(|r| r.scale_id == "S1"));
    assert_eq!(bundle.signature, None);
}

#[test]
fn job_can_be_redeemed_repeatedly_until_expiry() {
    let (env, _, vault) = setup();
    let admin = Principal::new("T1", "admin");
    let ticket = vault.request_export(&admin, "S1", "1.2.3.4").unwrap();
    let auth = job_auth(&ticket.url, &ticket.job_id);

    vault.download_export(&admin, &auth).unwrap();
    vault.download_export(&admin, &auth).unwrap();

    env.advance(Duration::from_secs(300));
    assert_eq!(vault.download_export(&admin, &auth), Err(VaultError::NotFound("export job")));
}

#[test]
fn signed_bundle_carries_signer_output_over_manifest_bytes() {
    let (_, _, vault) = setup();
    let signer = RecordingSigner::new();
    let vault = vault.with_signer(Arc::new(signer.clone()));
    let admin = Principal::new("T1", "admin").with_step_up();

    let bundle =
        vault.download_export(&admin, &DownloadAuth::StepUp { scale_id: "S1".into() }).unwrap();

    let bytes = bundle.manifest.to_bytes().unwrap();
    assert_eq!(signer.messages(), vec![bytes.clone()]);
    assert_eq!(bundle.signature, Some(RecordingSigner::signature_for(&bytes)));
}

#[test]
fn failing_signer_releases_nothing() {
    let (_, storage, vault) = setup();
    let vault = vault.with_signer(Arc::new(FailingSigner));
    let admin = Principal::new("T1", "admin").with_step_up();

    let result = vault.download_export(&admin, &DownloadAuth::StepUp { scale_id: "S1".into() });
    assert!(matches!(result, Err(VaultError::Signing(_))));
    assert_eq!(storage.audit_len(), 0);
}

#[test]
fn step_up_path_checks_signal_and_ownership() {
    let (_, _, vault) = setup();
    let auth = DownloadAuth::StepUp { scale_id: "S1".into() };

    assert_eq!(
        vault.download_export(&Principal::new("T1", "admin"), &auth),
        Err(VaultError::Forbidden)
    );
    assert_eq!(
        vault.download_export(&Principal::new("T2", "admin").with_step_up(), &auth),
        Err(VaultError::Forbidden)
    );
    let missing = DownloadAuth::StepUp { scale_id: "nope".into() };
    assert_eq!(
        vault.download_export(&Principal::new("T1", "admin").with_step_up(), &missing),
        Err(VaultError::Forbidden)
    );
}

#[test]
fn every_download_is_audited_with_manifest_hash() {
    let (_, _, vault) = setup();
    let admin = Principal::new("T1", "admin").with_step_up();
    let auth = DownloadAuth::StepUp { scale_id: "S1".into() };

    let bundle = vault.download_export(&admin, &auth).unwrap();

    let audit = vault.list_audit(10).unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::ExportE2eeDownload);
    assert_eq!(audit[0].actor, "admin");
    assert_eq!(audit[0].target, "scale:S1");
    assert_eq!(audit[0].note, format!("count=3 sha256={}", bundle.manifest_sha256));
    assert_eq!(bundle.manifest_sha256.len(), 64);
}
