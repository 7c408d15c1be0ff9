use std::sync::Arc;

use axum::{
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;
use validator::Validate;

use crate::{
    dtos::matchdtos::{AlgorithmInfoDto, MatchRequestDto},
    error::{ErrorMessage, HttpError},
    service::matching_service::AlgorithmChoice,
    AppState,
};

pub fn matching_handler() -> Router {
    Router::new()
        .route("/match", post(match_jobs))
        .route("/compare", post(compare_algorithms))
        .route("/explain", post(explain_selection))
        .route("/algorithms", get(list_algorithms))
        .route("/performance", get(algorithm_performance))
}

/// `POST /api/match` - synchronous matching with automatic or explicit
/// variant selection.
pub async fn match_jobs(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<MatchRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;
    if body.candidate.is_null() {
        return Err(HttpError::bad_request(ErrorMessage::EmptyCandidate.to_str()));
    }

    let defaults = app_state.matching_service.defaults();
    let options = body.options.unwrap_or_default().into_options(defaults);

    let response = app_state
        .matching_service
        .execute(&body.candidate, &body.jobs, &options)
        .await
        .map_err(HttpError::from)?;

    Ok(Json(response))
}

/// `POST /api/compare` - forces comparison mode over the configured
/// variant subset.
pub async fn compare_algorithms(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<MatchRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let defaults = app_state.matching_service.defaults();
    let mut options = body.options.unwrap_or_default().into_options(defaults);
    options.algorithm = AlgorithmChoice::Comparison;

    let response = app_state
        .matching_service
        .execute(&body.candidate, &body.jobs, &options)
        .await
        .map_err(HttpError::from)?;

    Ok(Json(response))
}

/// `POST /api/explain` - the selector's rationale without scoring.
pub async fn explain_selection(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<MatchRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let explanation = app_state
        .matching_service
        .explain(&body.candidate, &body.jobs)
        .map_err(HttpError::from)?;

    Ok(Json(explanation))
}

/// `GET /api/algorithms` - variants and their declared capabilities.
pub async fn list_algorithms(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let algorithms: Vec<AlgorithmInfoDto> = app_state
        .matching_service
        .selector()
        .all()
        .iter()
        .map(|variant| AlgorithmInfoDto {
            name: variant.name().to_string(),
            capabilities: variant.capabilities(),
        })
        .collect();

    Ok(Json(json!({ "algorithms": algorithms })))
}

/// `GET /api/performance` - per-algorithm execution counters plus the
/// travel provider's usage stats.
pub async fn algorithm_performance(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(json!({
        "algorithms": app_state.performance.snapshot(),
        "travel": app_state.travel_service.usage_stats(),
    })))
}
