//! Bundle Builder
//!
//! Assembles what a download releases: a manifest describing the export, an
//! optional signature over the manifest's JSON bytes, and the ciphertext
//! records. Bundles are built fresh on every download and never stored.
//!
//! The manifest is signed exactly as serialized here (compact JSON, fields in
//! declaration order). Verifiers re-serialize [`ExportBundle::manifest`] the
//! same way, or check [`ExportBundle::manifest_sha256`] first.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::{
    access::{owned_scale, scale_target},
    audit,
    collaborators::ManifestSigner,
    env::Environment,
    error::VaultError,
    model::{AuditAction, ExportedResponse, Principal},
    storage::Storage,
};

/// Manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Manifest type tag.
pub const MANIFEST_TYPE: &str = "sealform.e2ee-export";

/// Describes one export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version, currently [`MANIFEST_VERSION`]
    pub version: u32,
    /// Always [`MANIFEST_TYPE`]
    #[serde(rename = "type")]
    pub kind: String,
    /// Exported scale
    pub scale_id: String,
    /// Number of responses in the bundle
    pub count: usize,
    /// Unix seconds
    pub created_at: u64,
}

impl Manifest {
    /// Bytes the signature and hash cover.
    pub fn to_bytes(&self) -> Result<Vec<u8>, VaultError> {
        serde_json::to_vec(self).map_err(|e| VaultError::Encoding(e.to_string()))
    }
}

/// How a download is authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadAuth {
    /// Redeem an export job; the scale comes from the job.
    Job {
        /// Job handle
        job_id: String,
        /// Job secret
        token: String,
    },
    /// Freshly re-authenticated admin of the owning tenant.
    StepUp {
        /// Scale to export
        scale_id: String,
    },
}

/// A released export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportBundle {
    /// What was exported
    pub manifest: Manifest,
    /// Signature over the manifest bytes, if a signer is configured
    pub signature: Option<String>,
    /// SHA-256 of the manifest bytes, hex; also recorded in the audit log
    pub manifest_sha256: String,
    /// Ciphertext records in submission order
    pub responses: Vec<ExportedResponse>,
}

/// Builds export bundles.
#[derive(Clone)]
pub struct BundleBuilder<E, S> {
    env: E,
    storage: S,
    signer: Option<Arc<dyn ManifestSigner>>,
}

impl<E: Environment, S: Storage> BundleBuilder<E, S> {
    /// Builder without a signer; bundles ship unsigned.
    pub fn new(env: E, storage: S) -> Self {
        Self { env, storage, signer: None }
    }

    /// Sign every manifest with `signer`.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn ManifestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Whether manifests are signed.
    pub fn is_signing(&self) -> bool {
        self.signer.is_some()
    }

    /// Download through the step-up path.
    ///
    /// The principal must carry a fresh step-up signal and own the scale.
    pub fn step_up_bundle(
        &self,
        principal: &Principal,
        scale_id: &str,
    ) -> Result<ExportBundle, VaultError> {
        if !principal.step_up {
            warn!(tenant = %principal.tenant_id, scale = %scale_id, "download without step-up");
            return Err(VaultError::Forbidden);
        }
        owned_scale(&self.storage, principal, scale_id)?;

        self.build_bundle(&principal.actor, scale_id)
    }

    /// Assemble, sign and audit a bundle for an already authorized caller.
    ///
    /// The audit entry is written before the bundle is returned; if it
    /// cannot be written, nothing is released.
    pub fn build_bundle(&self, actor: &str, scale_id: &str) -> Result<ExportBundle, VaultError> {
        let responses: Vec<ExportedResponse> = self
            .storage
            .list_e2ee_responses(scale_id)?
            .iter()
            .map(|response| response.exported())
            .collect();

        let manifest = Manifest {
            version: MANIFEST_VERSION,
            kind: MANIFEST_TYPE.to_string(),
            scale_id: scale_id.to_string(),
            count: responses.len(),
            created_at: self.env.wall_clock_secs(),
        };
        let bytes = manifest.to_bytes()?;
        let manifest_sha256 = hex::encode(Sha256::digest(&bytes));

        let signature = match &self.signer {
            Some(signer) => Some(signer.sign(&bytes).map_err(|e| {
                warn!(scale = %scale_id, error = %e, "manifest signing failed");
                VaultError::Signing(e.0)
            })?),
            None => None,
        };

        audit::record(
            &self.env,
            &self.storage,
            actor,
            AuditAction::ExportE2eeDownload,
            scale_target(scale_id),
            format!("count={} sha256={manifest_sha256}", manifest.count),
        )?;

        info!(
            scale = %scale_id,
            count = manifest.count,
            signed = signature.is_some(),
            "export bundle released"
        );

        Ok(ExportBundle { manifest, signature, manifest_sha256, responses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collaborators::SignerError,
        env::testing::ManualEnv,
        model::{E2eeResponse, Scale},
        storage::{AuditLog, MemoryStorage, ResponseStore, ScaleStore},
    };

    struct Prefix;

    impl ManifestSigner for Prefix {
        fn sign(&self, message: &[u8]) -> Result<String, SignerError> {
            Ok(format!("sig:{}", message.len()))
        }
    }

    struct Broken;

    impl ManifestSigner for Broken {
        fn sign(&self, _message: &[u8]) -> Result<String, SignerError> {
            Err(SignerError("hsm offline".into()))
        }
    }

    fn setup() -> (MemoryStorage, BundleBuilder<ManualEnv, MemoryStorage>) {
        let storage = MemoryStorage::new();
        storage
            .put_scale(&Scale {
                id: "S1".into(),
                tenant_id: "T1".into(),
                name: String::new(),
                turnstile_enabled: false,
            })
            .unwrap();
        for id in ["r1", "r2"] {
            storage
                .add_e2ee_response(&E2eeResponse {
                    scale_id: "S1".into(),
                    response_id: id.into(),
                    ciphertext: format!("C-{id}"),
                    nonce: "N".into(),
                    aad_hash: String::new(),
                    enc_dek: vec!["D".into()],
                    pmk_fingerprint: "fp1".into(),
                    created_at: 1,
                    self_token: format!("secret-{id}"),
                })
                .unwrap();
        }
        (storage.clone(), BundleBuilder::new(ManualEnv::at(500), storage))
    }

    #[test]
    fn manifest_json_shape() {
        let manifest = Manifest {
            version: 1,
            kind: MANIFEST_TYPE.into(),
            scale_id: "S1".into(),
            count: 2,
            created_at: 500,
        };
        let json = String::from_utf8(manifest.to_bytes().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"version":1,"type":"sealform.e2ee-export","scale_id":"S1","count":2,"created_at":500}"#
        );
    }

    #[test]
    fn unsigned_bundle_is_audited_with_hash() {
        let (storage, builder) = setup();

        let bundle = builder.build_bundle("admin", "S1").unwrap();
        assert_eq!(bundle.manifest.count, 2);
        assert_eq!(bundle.signature, None);
        assert_eq!(bundle.responses[0].response_id, "r1");

        let json = serde_json::to_string(&bundle).unwrap();
        assert!(!json.contains("secret-r1"));

        let expected = hex::encode(Sha256::digest(bundle.manifest.to_bytes().unwrap()));
        assert_eq!(bundle.manifest_sha256, expected);

        let audit = storage.list_audit(1).unwrap();
        assert_eq!(audit[0].action, AuditAction::ExportE2eeDownload);
        assert!(audit[0].note.contains(&expected));
    }

    #[test]
    fn signer_output_is_attached() {
        let (_, builder) = setup();
        let builder = builder.with_signer(Arc::new(Prefix));

        let bundle = builder.build_bundle("admin", "S1").unwrap();
        let len = bundle.manifest.to_bytes().unwrap().len();
        assert_eq!(bundle.signature, Some(format!("sig:{len}")));
    }

    #[test]
    fn failing_signer_fails_download_without_audit() {
        let (storage, builder) = setup();
        let builder = builder.with_signer(Arc::new(Broken));

        assert_eq!(
            builder.build_bundle("admin", "S1"),
            Err(VaultError::Signing("hsm offline".into()))
        );
        assert_eq!(storage.audit_len(), 0);
    }

    #[test]
    fn step_up_requires_signal_and_ownership() {
        let (_, builder) = setup();

        let plain = Principal::new("T1", "admin");
        assert_eq!(builder.step_up_bundle(&plain, "S1"), Err(VaultError::Forbidden));

        let foreign = Principal::new("T2", "admin").with_step_up();
        assert_eq!(builder.step_up_bundle(&foreign, "S1"), Err(VaultError::Forbidden));

        let owner = Principal::new("T1", "admin").with_step_up();
        assert_eq!(builder.step_up_bundle(&owner, "S1").unwrap().manifest.count, 2);
    }
}
