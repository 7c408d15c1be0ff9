// routes.rs
use std::sync::Arc;

use axum::{routing::get, Extension, Json, Router};
use tower_http::trace::TraceLayer;

use crate::{
    dtos::matchdtos::HealthResponseDto,
    handler::{matching::matching_handler, queue::queue_handler},
    AppState,
};

async fn health_check(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Json<HealthResponseDto> {
    let algorithms_available = app_state
        .matching_service
        .selector()
        .all()
        .iter()
        .map(|variant| variant.name().to_string())
        .collect();

    Json(HealthResponseDto {
        status: "ok".to_string(),
        uptime_s: app_state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        algorithms_available,
        cache_status: app_state.db_client.cache_status().to_string(),
    })
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_routes = matching_handler();
    let queue_routes = queue_handler();

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .nest("/v2", queue_routes)
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state))
}
