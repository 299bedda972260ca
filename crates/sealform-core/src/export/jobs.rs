#![allow(clippy::disallowed_types, reason = "Lock is held only for the map read/write")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{model::ExportJob, storage::StorageError};

/// Working set of live export jobs.
///
/// Jobs are ephemeral: a restart forgets them and clients request a new one.
/// Implementations must treat a job as absent from `expires_at` on, whether
/// or not it has been swept.
pub trait ExportJobStore: Send + Sync + 'static {
    /// Insert a freshly minted job. May sweep jobs expired at
    /// `job.created_at`.
    fn create(&self, job: ExportJob) -> Result<(), StorageError>;

    /// Look up a job by id. `None` if unknown or expired at `now`.
    fn get(&self, job_id: &str, now: u64) -> Result<Option<ExportJob>, StorageError>;

    /// Newest unexpired job for `(tenant, scale, ip)` created at or after
    /// `since`.
    fn find_recent(
        &self,
        tenant_id: &str,
        scale_id: &str,
        request_ip: &str,
        since: u64,
        now: u64,
    ) -> Result<Option<ExportJob>, StorageError>;
}

/// In-process [`ExportJobStore`] with lazy expiry.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<Mutex<HashMap<String, ExportJob>>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs held, expired or not.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.len())
    }

    /// Whether the store holds no jobs.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, ExportJob>>, StorageError> {
        self.jobs.lock().map_err(|_| StorageError::Io("export job store lock poisoned".into()))
    }
}

fn sweep(jobs: &mut HashMap<String, ExportJob>, now: u64) {
    jobs.retain(|_, job| !job.is_expired(now));
}

impl ExportJobStore for MemoryJobStore {
    fn create(&self, job: ExportJob) -> Result<(), StorageError> {
        let mut jobs = self.lock()?;
        sweep(&mut jobs, job.created_at);

        if jobs.contains_key(&job.id) {
            return Err(StorageError::Duplicate { kind: "export job", id: job.id });
        }

        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn get(&self, job_id: &str, now: u64) -> Result<Option<ExportJob>, StorageError> {
        let jobs = self.lock()?;
        Ok(jobs.get(job_id).filter(|job| !job.is_expired(now)).cloned())
    }

    fn find_recent(
        &self,
        tenant_id: &str,
        scale_id: &str,
        request_ip: &str,
        since: u64,
        now: u64,
    ) -> Result<Option<ExportJob>, StorageError> {
        let mut jobs = self.lock()?;
        sweep(&mut jobs, now);

        Ok(jobs
            .values()
            .filter(|job| {
                job.tenant_id == tenant_id
                    && job.scale_id == scale_id
                    && job.request_ip == request_ip
                    && job.created_at >= since
            })
            .max_by_key(|job| job.created_at)
            .cloned())
    }
}
