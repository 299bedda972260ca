//! Tenant ownership checks shared by the admin-facing components.

use tracing::warn;

use crate::{
    error::VaultError,
    model::{Principal, Scale},
    storage::ScaleStore,
};

/// Load a scale the principal's tenant owns.
///
/// An absent scale is not owned, so it is `Forbidden` too. Callers cannot
/// probe other tenants' scale ids through this check.
pub(crate) fn owned_scale<S: ScaleStore>(
    storage: &S,
    principal: &Principal,
    scale_id: &str,
) -> Result<Scale, VaultError> {
    match storage.get_scale(scale_id)? {
        Some(scale) if scale.tenant_id == principal.tenant_id => Ok(scale),
        _ => {
            warn!(tenant = %principal.tenant_id, scale = %scale_id, "scale access denied");
            Err(VaultError::Forbidden)
        },
    }
}

/// Audit target for a scale.
pub(crate) fn scale_target(scale_id: &str) -> String {
    format!("scale:{scale_id}")
}
