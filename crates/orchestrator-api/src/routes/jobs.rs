//! Job Service HTTP surface (spec §6.1): create, poll, assign, submit
//! result, list, fetch, cancel, and download.

use std::time::Duration;

use axum::extract::{Extension, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use orchestrator_core::{Job, JobStatus, JobWithAssignments, Pagination, SubmittedStatus};

use crate::error::{ApiError, ApiResult};
use crate::middleware::Caller;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    #[serde(rename = "type")]
    pub job_type: String,
    pub input_payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    #[serde(flatten)]
    pub job: Job,
    pub cached: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,

    #[serde(flatten)]
    pub pagination: Pagination,

    /// Admins may list any user's jobs; everyone else is pinned to their own.
    #[serde(rename = "userId")]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    #[serde(rename = "jobType")]
    pub job_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub job_id: Uuid,
    pub ecs_task_arn: String,
    pub ecs_cluster_arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResultRequest {
    pub status: SubmittedStatus,
    pub result_payload: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(rename = "expirySeconds")]
    pub expiry_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub job_id: Uuid,
    pub files: std::collections::BTreeMap<String, String>,
}

async fn create_job(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<CreateJobRequest>,
) -> ApiResult<Json<CreateJobResponse>> {
    let outcome = state
        .job_service
        .create(caller.user_id, &body.job_type, body.input_payload)
        .await?;
    Ok(Json(CreateJobResponse {
        job: outcome.job,
        cached: outcome.cached,
    }))
}

async fn list_jobs(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<ListJobsResponse>> {
    let owner = if caller.is_admin {
        query.user_id
    } else {
        Some(caller.user_id)
    };

    query
        .pagination
        .validate()
        .map_err(|e| ApiError(orchestrator_core::Error::validation(e.to_string())))?;

    let (jobs, total) = state
        .job_service
        .list(
            owner,
            query.status,
            query.pagination.per_page,
            query.pagination.offset(),
        )
        .await?;
    Ok(Json(ListJobsResponse { jobs, total }))
}

/// Job polling is restricted to admins — it is how the Capacity Manager and
/// workers discover pending work, not a general job-visibility endpoint.
async fn poll_jobs(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<PollQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    if !caller.is_admin {
        return Err(ApiError(orchestrator_core::Error::forbidden(
            "job polling requires the service principal",
        )));
    }
    let jobs = state.job_service.poll(query.job_type.as_deref()).await?;
    Ok(Json(jobs))
}

async fn assign_job(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<AssignRequest>,
) -> ApiResult<Json<orchestrator_core::JobAssignment>> {
    if !caller.is_admin {
        return Err(ApiError(orchestrator_core::Error::forbidden(
            "job assignment requires the service principal",
        )));
    }
    let assignment = state
        .job_service
        .assign(body.job_id, &body.ecs_task_arn, &body.ecs_cluster_arn)
        .await?;
    Ok(Json(assignment))
}

async fn submit_result(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(assignment_id): Path<Uuid>,
    Json(body): Json<SubmitResultRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if !caller.is_admin {
        return Err(ApiError(orchestrator_core::Error::forbidden(
            "result submission requires the service principal",
        )));
    }
    state
        .job_service
        .submit_result(assignment_id, body.status, body.result_payload)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn get_job(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobWithAssignments>> {
    let result = state.job_service.get_with_assignments(job_id).await?;
    if !caller.is_admin && result.job.user_id != caller.user_id {
        return Err(ApiError(orchestrator_core::Error::forbidden(
            "not the job owner",
        )));
    }
    Ok(Json(result))
}

async fn cancel_job(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    let job = state
        .job_service
        .cancel(job_id, caller.user_id, caller.is_admin)
        .await?;
    Ok(Json(job))
}

async fn download_job(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Json<DownloadResponse>> {
    let job = state.job_service.get_with_assignments(job_id).await?.job;
    if !caller.is_admin && job.user_id != caller.user_id {
        return Err(ApiError(orchestrator_core::Error::forbidden(
            "not the job owner",
        )));
    }

    let ttl = query.expiry_seconds.map(Duration::from_secs);
    let outcome = state.job_service.download(job_id, ttl).await?;
    Ok(Json(DownloadResponse {
        job_id: outcome.job.id,
        files: outcome.files,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/poll", get(poll_jobs))
        .route("/jobs/assign", post(assign_job))
        .route("/jobs/assignments/:id/result", post(submit_result))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route("/jobs/:id/download", get(download_job))
}
