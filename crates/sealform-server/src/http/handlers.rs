//! Route handlers.
//!
//! Each handler extracts identity and input, then runs the vault call on a
//! blocking thread: storage and the Turnstile client both block.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
};
use sealform_core::{
    DownloadAuth, Environment, ExportBundle, ExportTicket, ExportedResponse, IntakeReceipt,
    IntakeRequest, NewProjectKey, ProjectKey, RewrapListing, RewrapSubmission, Storage, Vault,
    VaultError,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    error::{ApiError, ApiResult},
    identity::{Caller, ClientIp, SELF_TOKEN_HEADER, TURNSTILE_HEADER, header},
};

/// Vault shared by all handlers.
pub type SharedVault<E, S> = Arc<Vault<E, S>>;

/// Recorded as the request address when neither proxy nor peer is known.
const UNKNOWN_CLIENT: &str = "unknown";

/// Liveness answer.
#[derive(Debug, Serialize)]
pub struct Health {
    /// Always `ok` while the process serves requests
    pub status: &'static str,
}

/// Job-path download query.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DownloadQuery {
    /// Export job id
    pub job: String,
    /// Export job token
    pub token: String,
}

/// Rewrap listing query.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RewrapQuery {
    /// Fingerprint being rotated away from
    pub from: String,
    /// Fingerprint being rotated to
    pub to: String,
}

/// Rewrap submission body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RewrapBody {
    /// Key every submitted DEK is wrapped under
    pub to_fp: String,
    /// One wrapped DEK per response
    pub items: Vec<RewrapSubmission>,
}

/// Rewrap submission result.
#[derive(Debug, Serialize)]
pub struct RewrapResult {
    /// Responses the new DEK was applied to
    pub updated: usize,
}

/// Run a vault call on the blocking pool.
async fn blocking<R, F>(task: F) -> ApiResult<R>
where
    F: FnOnce() -> Result<R, VaultError> + Send + 'static,
    R: Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => Err(ApiError::Internal(err.to_string())),
    }
}

fn malformed(rejection: impl std::fmt::Display) -> ApiError {
    ApiError::Malformed(rejection.to_string())
}

/// `GET /healthz`
pub async fn healthz() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// `POST /api/v1/scales/:scale_id/e2ee/keys`
pub async fn add_project_key<E: Environment, S: Storage>(
    State(vault): State<SharedVault<E, S>>,
    Caller(principal): Caller,
    Path(scale_id): Path<String>,
    body: Result<Json<NewProjectKey>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ProjectKey>)> {
    let Json(key) = body.map_err(malformed)?;
    let key = blocking(move || vault.add_project_key(&principal, &scale_id, key)).await?;
    Ok((StatusCode::CREATED, Json(key)))
}

/// `GET /api/v1/scales/:scale_id/e2ee/keys`
pub async fn list_project_keys<E: Environment, S: Storage>(
    State(vault): State<SharedVault<E, S>>,
    Path(scale_id): Path<String>,
) -> ApiResult<Json<Vec<ProjectKey>>> {
    Ok(Json(blocking(move || vault.list_project_keys(&scale_id)).await?))
}

/// `GET /api/v1/scales/:scale_id/e2ee/keys/active`
pub async fn active_project_key<E: Environment, S: Storage>(
    State(vault): State<SharedVault<E, S>>,
    Path(scale_id): Path<String>,
) -> ApiResult<Json<ProjectKey>> {
    let key = blocking(move || {
        vault.active_project_key(&scale_id)?.ok_or(VaultError::NotFound("project key"))
    })
    .await?;
    Ok(Json(key))
}

/// `POST /api/v1/scales/:scale_id/e2ee/keys/:fingerprint/disable`
pub async fn disable_project_key<E: Environment, S: Storage>(
    State(vault): State<SharedVault<E, S>>,
    Caller(principal): Caller,
    Path((scale_id, fingerprint)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    blocking(move || vault.disable_project_key(&principal, &scale_id, &fingerprint)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/e2ee/responses`
pub async fn intake<E: Environment, S: Storage>(
    State(vault): State<SharedVault<E, S>>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    body: Result<Json<IntakeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<IntakeReceipt>)> {
    let Json(mut request) = body.map_err(malformed)?;
    if let Some(token) = header(&headers, TURNSTILE_HEADER) {
        request.turnstile_token = Some(token.to_string());
    }

    let receipt = blocking(move || vault.intake(request, ip.as_deref())).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// `GET /api/v1/e2ee/responses/:response_id/self`
pub async fn self_export<E: Environment, S: Storage>(
    State(vault): State<SharedVault<E, S>>,
    Path(response_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<ExportedResponse>> {
    let token = header(&headers, SELF_TOKEN_HEADER).unwrap_or_default().to_string();
    Ok(Json(blocking(move || vault.self_export(&response_id, &token)).await?))
}

/// `DELETE /api/v1/e2ee/responses/:response_id/self`
pub async fn self_delete<E: Environment, S: Storage>(
    State(vault): State<SharedVault<E, S>>,
    Path(response_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let token = header(&headers, SELF_TOKEN_HEADER).unwrap_or_default().to_string();
    blocking(move || vault.self_delete(&response_id, &token)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/scales/:scale_id/e2ee/export`
pub async fn request_export<E: Environment, S: Storage>(
    State(vault): State<SharedVault<E, S>>,
    Caller(principal): Caller,
    Path(scale_id): Path<String>,
    ClientIp(ip): ClientIp,
) -> ApiResult<Json<ExportTicket>> {
    let ip = ip.unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
    let ticket = blocking(move || vault.request_export(&principal, &scale_id, &ip)).await?;
    debug!(job = %ticket.job_id, reused = ticket.reused, "export ticket issued");
    Ok(Json(ticket))
}

/// `GET /api/v1/e2ee/export/download?job=&token=`
pub async fn download_job<E: Environment, S: Storage>(
    State(vault): State<SharedVault<E, S>>,
    Caller(principal): Caller,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> ApiResult<Json<ExportBundle>> {
    let Query(query) = query.map_err(malformed)?;
    let auth = DownloadAuth::Job { job_id: query.job, token: query.token };
    Ok(Json(blocking(move || vault.download_export(&principal, &auth)).await?))
}

/// `GET /api/v1/scales/:scale_id/e2ee/export/download`
pub async fn download_step_up<E: Environment, S: Storage>(
    State(vault): State<SharedVault<E, S>>,
    Caller(principal): Caller,
    Path(scale_id): Path<String>,
) -> ApiResult<Json<ExportBundle>> {
    let auth = DownloadAuth::StepUp { scale_id };
    Ok(Json(blocking(move || vault.download_export(&principal, &auth)).await?))
}

/// `GET /api/v1/scales/:scale_id/e2ee/rewrap?from=&to=`
pub async fn list_rewrap_items<E: Environment, S: Storage>(
    State(vault): State<SharedVault<E, S>>,
    Caller(principal): Caller,
    Path(scale_id): Path<String>,
    query: Result<Query<RewrapQuery>, QueryRejection>,
) -> ApiResult<Json<RewrapListing>> {
    let Query(query) = query.map_err(malformed)?;
    let listing = blocking(move || {
        vault.list_rewrap_items(&principal, &scale_id, &query.from, &query.to)
    })
    .await?;
    Ok(Json(listing))
}

/// `POST /api/v1/scales/:scale_id/e2ee/rewrap`
pub async fn submit_rewrap<E: Environment, S: Storage>(
    State(vault): State<SharedVault<E, S>>,
    Caller(principal): Caller,
    Path(scale_id): Path<String>,
    body: Result<Json<RewrapBody>, JsonRejection>,
) -> ApiResult<Json<RewrapResult>> {
    let Json(body) = body.map_err(malformed)?;
    let updated = blocking(move || {
        vault.submit_rewrap(&principal, &scale_id, &body.items, &body.to_fp)
    })
    .await?;
    Ok(Json(RewrapResult { updated }))
}
