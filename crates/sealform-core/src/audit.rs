//! Audit trail helpers.
//!
//! Every state-changing operation except intake appends one entry. Intake is
//! deliberately silent: a participant's submission must not be inferable from
//! the audit trail.
//!
//! Two write modes:
//!
//! - [`record`] fails the operation when the append fails. Used before data
//!   leaves the server (downloads), so a release is never unaccounted for.
//! - [`record_after_commit`] logs and swallows the failure. Used after the
//!   mutation has been committed, so the caller is not told "failed" about a
//!   change that happened.

use tracing::error;

use crate::{
    env::Environment,
    error::VaultError,
    model::{AuditAction, AuditEntry},
    storage::AuditLog,
};

/// Build an entry stamped with the environment clock.
pub fn entry<E: Environment>(
    env: &E,
    actor: &str,
    action: AuditAction,
    target: String,
    note: String,
) -> AuditEntry {
    AuditEntry { time: env.wall_clock_secs(), actor: actor.to_string(), action, target, note }
}

/// Append an entry, propagating failure.
pub fn record<E: Environment, S: AuditLog>(
    env: &E,
    storage: &S,
    actor: &str,
    action: AuditAction,
    target: String,
    note: String,
) -> Result<(), VaultError> {
    storage.add_audit(&entry(env, actor, action, target, note))?;
    Ok(())
}

/// Append an entry after the audited change is already committed.
pub fn record_after_commit<E: Environment, S: AuditLog>(
    env: &E,
    storage: &S,
    actor: &str,
    action: AuditAction,
    target: String,
    note: String,
) {
    if let Err(e) = storage.add_audit(&entry(env, actor, action, target, note)) {
        error!(%action, error = %e, "failed to append audit entry");
    }
}
