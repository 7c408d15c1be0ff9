use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    dtos::queuedtos::{
        EnqueueFindCandidatesDto, EnqueueMatchDto, EnqueueQueryDto, EnqueueResponseDto,
    },
    error::{ErrorMessage, HttpError},
    service::queue_service::{JobPriority, QueuedJob, TaskKind},
    AppState,
};

pub fn queue_handler() -> Router {
    Router::new()
        .route("/match", post(enqueue_match))
        .route("/find-jobs", post(enqueue_find_jobs))
        .route("/find-candidates", post(enqueue_find_candidates))
        .route("/status/:job_id", get(job_status))
        .route("/result/:job_id", get(job_result))
}

/// Stamps the query-string entity id onto a raw record that lacks one.
fn inject_id(record: &mut Value, id: Option<&String>) {
    if let (Some(id), Some(object)) = (id, record.as_object_mut()) {
        object
            .entry("id")
            .or_insert_with(|| Value::String(id.clone()));
    }
}

fn new_job(kind: TaskKind, query: &EnqueueQueryDto) -> QueuedJob {
    QueuedJob {
        id: String::new(),
        kind,
        candidate: None,
        candidates: Vec::new(),
        job: None,
        jobs: Vec::new(),
        with_commute_time: query.with_commute_time,
        algorithm: None,
        limit: None,
        min_score: None,
        webhook_url: None,
        priority: JobPriority::from_label(query.priority.as_deref()),
        retries_left: 0,
        enqueued_at: 0,
    }
}

/// `POST /v2/match` - enqueues one candidate/jobs match.
pub async fn enqueue_match(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(query): Query<EnqueueQueryDto>,
    Json(body): Json<EnqueueMatchDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let mut job = new_job(TaskKind::Match, &query);
    job.id = query.job_id.clone().unwrap_or_default();
    let mut candidate = body.candidate;
    inject_id(&mut candidate, query.candidate_id.as_ref());
    job.candidate = Some(candidate);
    job.jobs = body.jobs;
    job.webhook_url = body.webhook_url;
    if let Some(options) = body.options {
        job.algorithm = options.algorithm;
        job.limit = options.limit;
        job.min_score = options.min_score;
    }

    let job_id = app_state
        .queue_service
        .enqueue(job)
        .await
        .map_err(HttpError::from)?;

    Ok(Json(EnqueueResponseDto {
        job_id,
        status: "queued",
    }))
}

/// `POST /v2/find-jobs` - fan-out search of postings for a candidate.
pub async fn enqueue_find_jobs(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(query): Query<EnqueueQueryDto>,
    Json(body): Json<EnqueueMatchDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let mut job = new_job(TaskKind::FindJobs, &query);
    let mut candidate = body.candidate;
    inject_id(&mut candidate, query.candidate_id.as_ref());
    job.candidate = Some(candidate);
    job.jobs = body.jobs;
    job.webhook_url = body.webhook_url;
    if let Some(options) = body.options {
        job.algorithm = options.algorithm;
        job.limit = options.limit;
        job.min_score = options.min_score;
    }

    let job_id = app_state
        .queue_service
        .enqueue(job)
        .await
        .map_err(HttpError::from)?;

    Ok(Json(EnqueueResponseDto {
        job_id,
        status: "queued",
    }))
}

/// `POST /v2/find-candidates` - fan-out search of candidates for a
/// posting.
pub async fn enqueue_find_candidates(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(query): Query<EnqueueQueryDto>,
    Json(body): Json<EnqueueFindCandidatesDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let mut job = new_job(TaskKind::FindCandidates, &query);
    let mut posting = body.job;
    inject_id(&mut posting, query.job_id.as_ref());
    job.job = Some(posting);
    job.candidates = body.candidates;
    job.webhook_url = body.webhook_url;
    if let Some(options) = body.options {
        job.algorithm = options.algorithm;
        job.limit = options.limit;
        job.min_score = options.min_score;
    }

    let job_id = app_state
        .queue_service
        .enqueue(job)
        .await
        .map_err(HttpError::from)?;

    Ok(Json(EnqueueResponseDto {
        job_id,
        status: "queued",
    }))
}

/// `GET /v2/status/{job_id}` - job lifecycle status.
pub async fn job_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let meta = app_state
        .queue_service
        .job_status(&job_id)
        .await
        .map_err(HttpError::from)?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::JobNotFound(job_id).to_str()))?;

    Ok(Json(meta))
}

/// `GET /v2/result/{job_id}` - the stored result, looked up through
/// the hot, row and blob tiers in order.
pub async fn job_result(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let result = app_state
        .result_store
        .fetch(&job_id)
        .await
        .map_err(HttpError::from)?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::JobNotFound(job_id.clone()).to_str()))?;

    Ok(Json(json!({ "job_id": job_id, "result": result })))
}
