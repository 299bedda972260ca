//! Export Job Store
//!
//! Issues short-lived capability URLs for bulk ciphertext downloads.
//!
//! # Request flow
//!
//! 1. Ownership check (`Forbidden`)
//! 2. Reuse: an unexpired job for the same tenant, scale and client address
//!    created within the reuse window is handed out again. The throttle is
//!    not consulted, so a double click never trips it.
//! 3. Throttle: at most one new job per tenant per `min_interval`. A request
//!    that loses the throttle to a concurrent one looks for a reusable job
//!    once more before reporting `TooManyRequests`, so simultaneous double
//!    clicks share one job.
//! 4. Store the job, audit
//!
//! # Redemption
//!
//! A job redeems only with the exact token, before `expires_at`, for the
//! tenant that requested it. The three failure causes are reported
//! identically.

mod jobs;
mod throttle;

use std::{fmt, time::Duration};

pub use jobs::{ExportJobStore, MemoryJobStore};
use serde::Serialize;
pub use throttle::{Admission, ExportThrottle, MemoryThrottle};
use tracing::{debug, info, warn};

use crate::{
    access::{owned_scale, scale_target},
    audit,
    capability::{self, JOB_TOKEN_BYTES},
    env::Environment,
    error::VaultError,
    model::{AuditAction, ExportJob, Principal},
    storage::Storage,
};

/// Timing knobs for export jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportPolicy {
    /// How long an issued job stays redeemable
    pub job_ttl: Duration,
    /// Window in which a repeated request returns the same job
    pub reuse_window: Duration,
    /// Minimum gap between new jobs for one tenant
    pub min_interval: Duration,
}

impl Default for ExportPolicy {
    fn default() -> Self {
        Self {
            job_ttl: Duration::from_secs(300),
            reuse_window: Duration::from_secs(30),
            min_interval: Duration::from_secs(10),
        }
    }
}

/// What the caller gets back from a successful export request.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ExportTicket {
    /// Job handle
    pub job_id: String,
    /// Download URL carrying the job id and token
    pub url: String,
    /// Unix seconds
    pub expires_at: u64,
    /// Whether an existing job was handed out again
    pub reused: bool,
}

impl fmt::Debug for ExportTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportTicket")
            .field("job_id", &self.job_id)
            .field("url", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("reused", &self.reused)
            .finish()
    }
}

/// Issues and redeems export jobs.
pub struct ExportIssuer<E, S, J = MemoryJobStore, T = MemoryThrottle> {
    env: E,
    storage: S,
    jobs: J,
    throttle: T,
    policy: ExportPolicy,
    download_path: String,
}

impl<E, S, J, T> ExportIssuer<E, S, J, T>
where
    E: Environment,
    S: Storage,
    J: ExportJobStore,
    T: ExportThrottle,
{
    /// Create an issuer. `download_path` is the URL path jobs redeem at.
    pub fn new(
        env: E,
        storage: S,
        jobs: J,
        throttle: T,
        policy: ExportPolicy,
        download_path: impl Into<String>,
    ) -> Self {
        Self { env, storage, jobs, throttle, policy, download_path: download_path.into() }
    }

    /// Active policy.
    pub fn policy(&self) -> ExportPolicy {
        self.policy
    }

    /// Issue (or reuse) an export job for a scale the caller's tenant owns.
    pub fn request_export(
        &self,
        principal: &Principal,
        scale_id: &str,
        remote_ip: &str,
    ) -> Result<ExportTicket, VaultError> {
        owned_scale(&self.storage, principal, scale_id)?;

        let now = self.env.wall_clock_secs();
        let since = now.saturating_sub(self.policy.reuse_window.as_secs());

        if let Some(job) =
            self.jobs.find_recent(&principal.tenant_id, scale_id, remote_ip, since, now)?
        {
            return self.reuse(principal, &job);
        }

        // Minted up front so nothing runs between admission and `create`
        let job = ExportJob {
            id: capability::mint_id(&self.env),
            tenant_id: principal.tenant_id.clone(),
            scale_id: scale_id.to_string(),
            token: capability::mint_token(&self.env, JOB_TOKEN_BYTES),
            request_ip: remote_ip.to_string(),
            created_at: now,
            expires_at: now.saturating_add(self.policy.job_ttl.as_secs()),
        };

        if let Admission::RetryAfter(retry_after_secs) =
            self.throttle.allow(&principal.tenant_id, self.policy.min_interval, now)?
        {
            if let Some(winner) =
                self.jobs.find_recent(&principal.tenant_id, scale_id, remote_ip, since, now)?
            {
                return self.reuse(principal, &winner);
            }
            warn!(tenant = %principal.tenant_id, retry_after_secs, "export throttled");
            return Err(VaultError::TooManyRequests { retry_after_secs });
        }
        self.jobs.create(job.clone())?;

        info!(job = %job.id, scale = %scale_id, expires_at = job.expires_at, "export job issued");
        audit::record_after_commit(
            &self.env,
            &self.storage,
            &principal.actor,
            AuditAction::ExportE2eeRequest,
            scale_target(scale_id),
            format!("job={}", job.id),
        );

        Ok(self.ticket(&job, false))
    }

    /// Redeem a job. Wrong token, expired job and foreign tenant are all
    /// `NotFound`.
    pub fn get_export_job(
        &self,
        principal: &Principal,
        job_id: &str,
        token: &str,
    ) -> Result<ExportJob, VaultError> {
        let now = self.env.wall_clock_secs();

        match self.jobs.get(job_id, now)? {
            Some(job)
                if capability::tokens_match(token, &job.token)
                    && job.tenant_id == principal.tenant_id =>
            {
                Ok(job)
            },
            _ => {
                debug!(job = %job_id, "export job did not redeem");
                Err(VaultError::NotFound("export job"))
            },
        }
    }

    fn reuse(&self, principal: &Principal, job: &ExportJob) -> Result<ExportTicket, VaultError> {
        debug!(job = %job.id, scale = %job.scale_id, "reusing recent export job");
        audit::record(
            &self.env,
            &self.storage,
            &principal.actor,
            AuditAction::ExportE2eeReuse,
            scale_target(&job.scale_id),
            format!("job={}", job.id),
        )?;
        Ok(self.ticket(job, true))
    }

    fn ticket(&self, job: &ExportJob, reused: bool) -> ExportTicket {
        ExportTicket {
            job_id: job.id.clone(),
            url: format!("{}?job={}&token={}", self.download_path, job.id, job.token),
            expires_at: job.expires_at,
            reused,
        }
    }
}
