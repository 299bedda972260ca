#![allow(clippy::disallowed_types, reason = "Lock is held only for the map read/write")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::storage::StorageError;

/// Outcome of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Go ahead; the request was recorded.
    Allowed,
    /// Denied; seconds until the tenant's window reopens (at least 1).
    RetryAfter(u64),
}

impl Admission {
    /// Whether the request may proceed.
    pub fn is_allowed(self) -> bool {
        self == Self::Allowed
    }
}

/// Per-tenant rate limit on new export jobs.
pub trait ExportThrottle: Send + Sync + 'static {
    /// Admits and records `now` if the tenant's last admitted request is at
    /// least `min_interval` old (or there is none). Otherwise records nothing
    /// and reports the time left.
    fn allow(
        &self,
        tenant_id: &str,
        min_interval: Duration,
        now: u64,
    ) -> Result<Admission, StorageError>;
}

/// In-process [`ExportThrottle`]. One timestamp per tenant.
#[derive(Clone, Default)]
pub struct MemoryThrottle {
    last_allowed: Arc<Mutex<HashMap<String, u64>>>,
}

impl MemoryThrottle {
    /// Create a throttle with no history.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExportThrottle for MemoryThrottle {
    fn allow(
        &self,
        tenant_id: &str,
        min_interval: Duration,
        now: u64,
    ) -> Result<Admission, StorageError> {
        let mut last_allowed = self
            .last_allowed
            .lock()
            .map_err(|_| StorageError::Io("export throttle lock poisoned".into()))?;

        if let Some(&last) = last_allowed.get(tenant_id) {
            let reopens_at = last.saturating_add(min_interval.as_secs());
            if now < reopens_at {
                return Ok(Admission::RetryAfter(reopens_at - now));
            }
        }

        last_allowed.insert(tenant_id.to_string(), now);
        Ok(Admission::Allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEN_SECS: Duration = Duration::from_secs(10);

    #[test]
    fn first_request_allowed_then_blocked_until_interval() {
        let throttle = MemoryThrottle::new();

        assert_eq!(throttle.allow("T1", TEN_SECS, 100).unwrap(), Admission::Allowed);
        assert_eq!(throttle.allow("T1", TEN_SECS, 105).unwrap(), Admission::RetryAfter(5));
        assert_eq!(throttle.allow("T1", TEN_SECS, 109).unwrap(), Admission::RetryAfter(1));
        assert_eq!(throttle.allow("T1", TEN_SECS, 110).unwrap(), Admission::Allowed);
    }

    #[test]
    fn denied_requests_do_not_extend_the_window() {
        let throttle = MemoryThrottle::new();

        assert!(throttle.allow("T1", TEN_SECS, 0).unwrap().is_allowed());
        for now in 1..10 {
            let admission = throttle.allow("T1", TEN_SECS, now).unwrap();
            assert_eq!(admission, Admission::RetryAfter(10 - now));
        }
        assert!(throttle.allow("T1", TEN_SECS, 10).unwrap().is_allowed());
    }

    #[test]
    fn tenants_are_independent() {
        let throttle = MemoryThrottle::new();

        assert!(throttle.allow("T1", TEN_SECS, 0).unwrap().is_allowed());
        assert!(throttle.allow("T2", TEN_SECS, 0).unwrap().is_allowed());
    }

    #[test]
    fn zero_interval_never_blocks() {
        let throttle = MemoryThrottle::new();

        assert!(throttle.allow("T1", Duration::ZERO, 0).unwrap().is_allowed());
        assert!(throttle.allow("T1", Duration::ZERO, 0).unwrap().is_allowed());
    }
}
