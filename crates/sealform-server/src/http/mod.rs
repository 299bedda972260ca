//! HTTP surface.
//!
//! A thin axum router over [`Vault`]. Identity comes from headers set by the
//! authenticating gateway in front of this service; see [`identity`].

mod error;
mod handlers;
pub mod identity;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{DownloadQuery, Health, RewrapBody, RewrapQuery, RewrapResult, SharedVault};
use sealform_core::{Environment, Storage, Vault};

/// Build the router for a vault.
pub fn router<E: Environment, S: Storage>(vault: Arc<Vault<E, S>>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route(
            "/api/v1/scales/:scale_id/e2ee/keys",
            post(handlers::add_project_key::<E, S>).get(handlers::list_project_keys::<E, S>),
        )
        .route(
            "/api/v1/scales/:scale_id/e2ee/keys/active",
            get(handlers::active_project_key::<E, S>),
        )
        .route(
            "/api/v1/scales/:scale_id/e2ee/keys/:fingerprint/disable",
            post(handlers::disable_project_key::<E, S>),
        )
        .route("/api/v1/e2ee/responses", post(handlers::intake::<E, S>))
        .route(
            "/api/v1/e2ee/responses/:response_id/self",
            get(handlers::self_export::<E, S>).delete(handlers::self_delete::<E, S>),
        )
        .route("/api/v1/scales/:scale_id/e2ee/export", post(handlers::request_export::<E, S>))
        .route("/api/v1/e2ee/export/download", get(handlers::download_job::<E, S>))
        .route(
            "/api/v1/scales/:scale_id/e2ee/export/download",
            get(handlers::download_step_up::<E, S>),
        )
        .route(
            "/api/v1/scales/:scale_id/e2ee/rewrap",
            get(handlers::list_rewrap_items::<E, S>).post(handlers::submit_rewrap::<E, S>),
        )
        .with_state(vault)
}
