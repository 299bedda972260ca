//! End-to-end key rotation: register, collect, rotate, export, retire.

use sealform_core::{
    AuditAction, DownloadAuth, MemoryStorage, Principal, RewrapSubmission, Vault, VaultConfig,
    VaultError,
};
use sealform_harness::{
    SimEnv,
    fixtures::{intake_request, new_key, seed_scale},
};

#[test]
fn rotation_keeps_old_and_new_deks_side_by_side() {
    let storage = MemoryStorage::new();
    seed_scale(&storage, "S1", "T1", false).unwrap();
    let vault = Vault::new(SimEnv::new(), storage, VaultConfig::default());
    let admin = Principal::new("T1", "admin");

    vault.add_project_key(&admin, "S1", new_key("fp-old")).unwrap();
    let first = vault.intake(intake_request("S1"), None).unwrap();

    // Rotation starts: new key registered, both active
    vault.add_project_key(&admin, "S1", new_key("fp-new")).unwrap();
    assert_eq!(vault.active_project_key("S1").unwrap().unwrap().fingerprint, "fp-new");
    let second = vault.intake(intake_request("S1"), None).unwrap();

    let listing = vault.list_rewrap_items(&admin, "S1", "fp-old", "fp-new").unwrap();
    assert_eq!(listing.items.len(), 2);

    let items: Vec<_> = listing
        .items
        .iter()
        .map(|item| RewrapSubmission {
            response_id: item.response_id.clone(),
            enc_dek: format!("{}@fp-new", item.response_id),
        })
        .collect();
    vault.submit_rewrap(&admin, "S1", &items, "fp-new").unwrap();

    // Retire the old key by hand
    vault.disable_project_key(&admin, "S1", "fp-old").unwrap();
    let keys = vault.list_project_keys("S1").unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys[0].disabled);
    assert!(!keys[1].disabled);

    let bundle = vault
        .download_export(
            &admin.clone().with_step_up(),
            &DownloadAuth::StepUp { scale_id: "S1".into() },
        )
        .unwrap();
    let by_id = |id: &str| bundle.responses.iter().find(|r| r.response_id == id).unwrap();

    let old = by_id(&first.response_id);
    assert_eq!(old.pmk_fingerprint, "fp-old");
    assert_eq!(old.enc_dek, vec!["D".to_string(), format!("{}@fp-new", first.response_id)]);

    let new = by_id(&second.response_id);
    assert_eq!(new.pmk_fingerprint, "fp-new");
    assert_eq!(new.enc_dek.len(), 2);

    let actions: Vec<_> = vault.list_audit(100).unwrap().into_iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        [
            AuditAction::ProjectKeyAdd,
            AuditAction::ProjectKeyAdd,
            AuditAction::RewrapSubmit,
            AuditAction::ProjectKeyDisable,
            AuditAction::ExportE2eeDownload,
        ]
    );
}

#[test]
fn tenants_cannot_touch_each_others_keys() {
    let storage = MemoryStorage::new();
    seed_scale(&storage, "S1", "T1", false).unwrap();
    let vault = Vault::new(SimEnv::new(), storage, VaultConfig::default());
    let owner = Principal::new("T1", "admin");
    let intruder = Principal::new("T2", "admin");

    vault.add_project_key(&owner, "S1", new_key("fp1")).unwrap();

    assert_eq!(vault.add_project_key(&intruder, "S1", new_key("fp2")), Err(VaultError::Forbidden));
    assert_eq!(vault.disable_project_key(&intruder, "S1", "fp1"), Err(VaultError::Forbidden));
    assert_eq!(
        vault.list_rewrap_items(&intruder, "S1", "fp1", "fp2"),
        Err(VaultError::Forbidden)
    );

    // Public keys are public
    assert_eq!(vault.list_project_keys("S1").unwrap().len(), 1);
}
