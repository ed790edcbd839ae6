//! Handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use atelier_core::params::JobParams;
use atelier_core::status::JobStatus;
use atelier_core::types::{JobId, OwnerId};
use atelier_pipeline::ServiceError;
use atelier_store::models::job::JobListQuery;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Request body for `POST /jobs`.
///
/// The generation parameters ride alongside the owner, selected by the
/// `kind` tag: `{ "owner_id": 7, "kind": "video", "prompt": "..." }`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub owner_id: OwnerId,
    #[serde(flatten)]
    pub params: JobParams,
}

/// Query parameters for `GET /jobs`.
///
/// `status` arrives as a string so an unknown value maps to the standard
/// validation error body instead of a bare extractor rejection.
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub owner_id: OwnerId,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Submit a new generation job. Returns 201 with the created job; the
/// token cost has already been reserved when the response goes out. Fails
/// with 402 when the owner's balance cannot cover the job and 400 when
/// the parameters do not validate.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    let job = state.service.submit(input.owner_id, input.params).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs?owner_id=&status=&limit=
///
/// List an owner's jobs, newest first. `status` filters to one lifecycle
/// state; `limit` caps the page (default 20, max 100).
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsQuery>,
) -> AppResult<impl IntoResponse> {
    let status = params
        .status
        .as_deref()
        .map(|s| s.parse::<JobStatus>())
        .transpose()
        .map_err(ServiceError::from)?;
    let query = JobListQuery {
        status,
        limit: params.limit,
    };

    let jobs = state.service.list(params.owner_id, &query).await?;
    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Status view of a single job: lifecycle state, token cost, the asset
/// URL once completed, and the failure reason once settled.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let view = state.service.status(job_id).await?;
    Ok(Json(DataResponse { data: view }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// DELETE /api/v1/jobs/{id}
///
/// Cancel a job. A pending job settles immediately (failed, refunded); a
/// processing job is flagged and settles at the poller's next pass.
/// Returns the job as of this request; 409 if it is already terminal.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.service.cancel(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}
