use std::sync::Arc;

use crate::{
    bundle::{BundleBuilder, DownloadAuth, ExportBundle},
    collaborators::{ManifestSigner, TurnstileVerifier},
    env::Environment,
    error::VaultError,
    export::{
        ExportIssuer, ExportJobStore, ExportPolicy, ExportThrottle, ExportTicket, MemoryJobStore,
        MemoryThrottle,
    },
    intake::{IntakeLimits, IntakePipeline, IntakeReceipt, IntakeRequest},
    keys::KeyRegistry,
    model::{AuditEntry, ExportJob, ExportedResponse, NewProjectKey, Principal, ProjectKey},
    rewrap::{RewrapCoordinator, RewrapListing, RewrapSubmission},
    storage::Storage,
};

/// Vault configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// Export job timing
    pub export: ExportPolicy,
    /// Intake size limits
    pub intake: IntakeLimits,
    /// URL path export jobs are redeemed at
    pub download_path: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            export: ExportPolicy::default(),
            intake: IntakeLimits::default(),
            download_path: "/api/v1/e2ee/export/download".to_string(),
        }
    }
}

/// Facade over the five components, sharing one environment and one storage.
///
/// Every method is synchronous and may block on storage or on the Turnstile
/// verifier. Async callers run it on a blocking thread.
pub struct Vault<E, S, J = MemoryJobStore, T = MemoryThrottle> {
    storage: S,
    keys: KeyRegistry<E, S>,
    intake: IntakePipeline<E, S>,
    export: ExportIssuer<E, S, J, T>,
    bundles: BundleBuilder<E, S>,
    rewrap: RewrapCoordinator<E, S>,
    verifier: Option<Arc<dyn TurnstileVerifier>>,
}

impl<E: Environment, S: Storage> Vault<E, S> {
    /// Vault with in-process export job and throttle state.
    pub fn new(env: E, storage: S, config: VaultConfig) -> Self {
        Self::with_stores(env, storage, config, MemoryJobStore::new(), MemoryThrottle::new())
    }
}

impl<E, S, J, T> Vault<E, S, J, T>
where
    E: Environment,
    S: Storage,
    J: ExportJobStore,
    T: ExportThrottle,
{
    /// Vault with caller-supplied export job and throttle state.
    pub fn with_stores(env: E, storage: S, config: VaultConfig, jobs: J, throttle: T) -> Self {
        Self {
            keys: KeyRegistry::new(env.clone(), storage.clone()),
            intake: IntakePipeline::new(env.clone(), storage.clone(), config.intake),
            export: ExportIssuer::new(
                env.clone(),
                storage.clone(),
                jobs,
                throttle,
                config.export,
                config.download_path,
            ),
            bundles: BundleBuilder::new(env.clone(), storage.clone()),
            rewrap: RewrapCoordinator::new(env, storage.clone()),
            storage,
            verifier: None,
        }
    }

    /// Sign export manifests.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn ManifestSigner>) -> Self {
        self.bundles = self.bundles.with_signer(signer);
        self
    }

    /// Bot-check submissions to scales with Turnstile enabled.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn TurnstileVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Export timing in effect.
    pub fn export_policy(&self) -> ExportPolicy {
        self.export.policy()
    }

    /// See [`KeyRegistry::add_project_key`].
    pub fn add_project_key(
        &self,
        principal: &Principal,
        scale_id: &str,
        key: NewProjectKey,
    ) -> Result<ProjectKey, VaultError> {
        self.keys.add_project_key(principal, scale_id, key)
    }

    /// See [`KeyRegistry::list_project_keys`].
    pub fn list_project_keys(&self, scale_id: &str) -> Result<Vec<ProjectKey>, VaultError> {
        self.keys.list_project_keys(scale_id)
    }

    /// See [`KeyRegistry::disable_project_key`].
    pub fn disable_project_key(
        &self,
        principal: &Principal,
        scale_id: &str,
        fingerprint: &str,
    ) -> Result<(), VaultError> {
        self.keys.disable_project_key(principal, scale_id, fingerprint)
    }

    /// See [`KeyRegistry::active_project_key`].
    pub fn active_project_key(&self, scale_id: &str) -> Result<Option<ProjectKey>, VaultError> {
        self.keys.active_project_key(scale_id)
    }

    /// Intake with the configured verifier, if any.
    pub fn intake(
        &self,
        request: IntakeRequest,
        remote_ip: Option<&str>,
    ) -> Result<IntakeReceipt, VaultError> {
        self.intake.intake(request, self.verifier.as_deref(), remote_ip)
    }

    /// See [`IntakePipeline::self_export`].
    pub fn self_export(
        &self,
        response_id: &str,
        self_token: &str,
    ) -> Result<ExportedResponse, VaultError> {
        self.intake.self_export(response_id, self_token)
    }

    /// See [`IntakePipeline::self_delete`].
    pub fn self_delete(&self, response_id: &str, self_token: &str) -> Result<(), VaultError> {
        self.intake.self_delete(response_id, self_token)
    }

    /// See [`ExportIssuer::request_export`].
    pub fn request_export(
        &self,
        principal: &Principal,
        scale_id: &str,
        remote_ip: &str,
    ) -> Result<ExportTicket, VaultError> {
        self.export.request_export(principal, scale_id, remote_ip)
    }

    /// See [`ExportIssuer::get_export_job`].
    pub fn get_export_job(
        &self,
        principal: &Principal,
        job_id: &str,
        token: &str,
    ) -> Result<ExportJob, VaultError> {
        self.export.get_export_job(principal, job_id, token)
    }

    /// Release a bundle through either authorization path.
    pub fn download_export(
        &self,
        principal: &Principal,
        auth: &DownloadAuth,
    ) -> Result<ExportBundle, VaultError> {
        match auth {
            DownloadAuth::Job { job_id, token } => {
                let job = self.export.get_export_job(principal, job_id, token)?;
                self.bundles.build_bundle(&principal.actor, &job.scale_id)
            },
            DownloadAuth::StepUp { scale_id } => self.bundles.step_up_bundle(principal, scale_id),
        }
    }

    /// See [`RewrapCoordinator::list_items`].
    pub fn list_rewrap_items(
        &self,
        principal: &Principal,
        scale_id: &str,
        from_fp: &str,
        to_fp: &str,
    ) -> Result<RewrapListing, VaultError> {
        self.rewrap.list_items(principal, scale_id, from_fp, to_fp)
    }

    /// See [`RewrapCoordinator::submit`].
    pub fn submit_rewrap(
        &self,
        principal: &Principal,
        scale_id: &str,
        items: &[RewrapSubmission],
        to_fp: &str,
    ) -> Result<usize, VaultError> {
        self.rewrap.submit(principal, scale_id, items, to_fp)
    }

    /// Most recent audit entries, oldest first.
    pub fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, VaultError> {
        Ok(self.storage.list_audit(limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::testing::ManualEnv,
        model::{AuditAction, Scale},
        storage::{MemoryStorage, ScaleStore},
    };

    fn vault() -> Vault<ManualEnv, MemoryStorage> {
        let storage = MemoryStorage::new();
        storage
            .put_scale(&Scale {
                id: "S1".into(),
                tenant_id: "T1".into(),
                name: String::new(),
                turnstile_enabled: false,
            })
            .unwrap();
        Vault::new(ManualEnv::at(100), storage, VaultConfig::default())
    }

    #[test]
    fn job_download_uses_scale_from_job() {
        let vault = vault();
        let admin = Principal::new("T1", "admin");

        vault
            .intake(
                IntakeRequest {
                    scale_id: "S1".into(),
                    ciphertext: "C".into(),
                    nonce: "N".into(),
                    enc_dek: vec!["D".into()],
                    ..IntakeRequest::default()
                },
                None,
            )
            .unwrap();

        let ticket = vault.request_export(&admin, "S1", "1.2.3.4").unwrap();
        assert!(ticket.url.starts_with("/api/v1/e2ee/export/download?job="));
        let token = ticket.url.rsplit("token=").next().unwrap().to_string();

        let bundle = vault
            .download_export(&admin, &DownloadAuth::Job { job_id: ticket.job_id.clone(), token })
            .unwrap();
        assert_eq!(bundle.manifest.scale_id, "S1");
        assert_eq!(bundle.manifest.count, 1);

        let bad = DownloadAuth::Job { job_id: ticket.job_id, token: "nope".into() };
        assert_eq!(vault.download_export(&admin, &bad), Err(VaultError::NotFound("export job")));

        let actions: Vec<_> = vault.list_audit(10).unwrap().into_iter().map(|e| e.action).collect();
        assert_eq!(actions, [AuditAction::ExportE2eeRequest, AuditAction::ExportE2eeDownload]);
    }
}
