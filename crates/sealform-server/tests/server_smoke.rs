//! The assembled server over a real TCP listener.

use std::path::PathBuf;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sealform_core::{Manifest, ScaleStore};
use sealform_server::{Ed25519Signer, MemoryStorage, Server, ServerError, ServerRuntimeConfig};
use serde_json::Value;
use tempfile::TempDir;

const SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

fn write_scales(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("scales.json");
    std::fs::write(&path, r#"[{"id":"S1","tenant_id":"T1","name":"Wellbeing"}]"#).unwrap();
    path
}

async fn start(config: ServerRuntimeConfig) -> String {
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    format!("http://{addr}")
}

#[tokio::test(flavor = "multi_thread")]
async fn serves_health_and_reuses_export_per_peer() {
    let dir = TempDir::new().unwrap();
    let base = start(ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        scales_path: Some(write_scales(&dir)),
        ..ServerRuntimeConfig::default()
    })
    .await;

    let (health, first, second) = tokio::task::spawn_blocking(move || {
        let health: Value =
            ureq::get(&format!("{base}/healthz")).call().unwrap().into_json().unwrap();

        let export = || -> Value {
            ureq::post(&format!("{base}/api/v1/scales/S1/e2ee/export"))
                .set("x-tenant-id", "T1")
                .set("x-actor", "admin")
                .call()
                .unwrap()
                .into_json()
                .unwrap()
        };
        (health, export(), export())
    })
    .await
    .unwrap();

    assert_eq!(health["status"], "ok");
    assert_eq!(first["job_id"], second["job_id"]);
    assert_eq!(second["reused"], true);
}

#[tokio::test(flavor = "multi_thread")]
async fn durable_signed_deployment() {
    let dir = TempDir::new().unwrap();
    let key_path = dir.path().join("manifest.key");
    std::fs::write(&key_path, SEED).unwrap();

    let base = start(ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        db_path: Some(dir.path().join("vault.redb")),
        signing_key_path: Some(key_path),
        scales_path: Some(write_scales(&dir)),
        ..ServerRuntimeConfig::default()
    })
    .await;

    let bundle: Value = tokio::task::spawn_blocking(move || {
        ureq::post(&format!("{base}/api/v1/e2ee/responses"))
            .send_json(serde_json::json!({
                "scale_id": "S1", "ciphertext": "C", "nonce": "N", "enc_dek": ["D"]
            }))
            .unwrap();

        ureq::get(&format!("{base}/api/v1/scales/S1/e2ee/export/download"))
            .set("x-tenant-id", "T1")
            .set("x-actor", "admin")
            .set("x-step-up", "1")
            .call()
            .unwrap()
            .into_json()
            .unwrap()
    })
    .await
    .unwrap();

    assert_eq!(bundle["manifest"]["count"], 1);

    // Researchers re-serialize the manifest and check it against the published key
    let manifest: Manifest = serde_json::from_value(bundle["manifest"].clone()).unwrap();
    let sig: [u8; 64] =
        hex::decode(bundle["signature"].as_str().unwrap()).unwrap().try_into().unwrap();
    let published = Ed25519Signer::from_seed_hex(SEED).unwrap().verifying_key_hex();
    let key: [u8; 32] = hex::decode(published).unwrap().try_into().unwrap();

    let verifying_key = VerifyingKey::from_bytes(&key).unwrap();
    assert!(
        verifying_key.verify(&manifest.to_bytes().unwrap(), &Signature::from_bytes(&sig)).is_ok()
    );
}

#[test]
fn malformed_scale_file_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scales.json");
    std::fs::write(&path, "{ nope").unwrap();

    let storage = MemoryStorage::new();
    let result = sealform_server::seed_scales(&storage, &path);

    assert!(matches!(result, Err(ServerError::Config(_))));
    assert!(storage.get_scale("S1").unwrap().is_none());
}

#[test]
fn seed_file_upserts_scales() {
    let dir = TempDir::new().unwrap();
    let storage = MemoryStorage::new();

    assert_eq!(sealform_server::seed_scales(&storage, &write_scales(&dir)).unwrap(), 1);
    let scale = storage.get_scale("S1").unwrap().unwrap();
    assert_eq!(scale.tenant_id, "T1");
    assert!(!scale.turnstile_enabled);
}
