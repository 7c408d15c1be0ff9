// main.rs
mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod models;
mod routes;
mod service;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use config::Config;
use dotenv::dotenv;
use routes::create_router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

use crate::{
    db::{db::DBClient, resultdb::MatchResultExt},
    service::{
        matching_service::{MatchDefaults, MatchingService},
        performance::PerformanceMonitor,
        queue_service::QueueService,
        result_store::ResultStore,
        scoring::SynonymTable,
        selector::AlgorithmSelector,
        travel_service::{
            ProviderMode, RouteSource, RoutingClient, TravelTimeService, TravelTimeSettings,
        },
        variants::{registry, MatchContext},
        webhook::WebhookNotifier,
    },
};

pub struct AppState {
    pub env: Config,
    pub started_at: Instant,
    pub db_client: Arc<DBClient>,
    pub matching_service: Arc<MatchingService>,
    pub travel_service: Arc<TravelTimeService>,
    pub queue_service: Arc<QueueService>,
    pub result_store: Arc<ResultStore>,
    pub performance: Arc<PerformanceMonitor>,
}

impl AppState {
    pub fn new(db_client: DBClient, config: Config) -> Self {
        let db_client = Arc::new(db_client);

        let routing_client = if config.travel_api_key.is_empty() {
            None
        } else {
            Some(Arc::new(RoutingClient::new(
                config.travel_api_url.clone(),
                config.travel_api_key.clone(),
                Duration::from_secs(config.travel_timeout_s),
            )) as Arc<dyn RouteSource>)
        };

        let travel_service = Arc::new(TravelTimeService::new(
            TravelTimeSettings {
                mode: ProviderMode::from_str(&config.travel_provider_mode),
                cache_ttl: Duration::from_secs(config.travel_cache_ttl_s),
                cache_max_entries: config.travel_cache_max_entries,
                max_concurrency: config.travel_concurrency,
                circuit_fail_max: config.circuit_fail_max,
                circuit_reset: Duration::from_secs(config.circuit_reset_s),
                max_retries: config.max_retries,
            },
            routing_client,
        ));

        let performance = Arc::new(PerformanceMonitor::new());

        let selector = AlgorithmSelector::new(
            registry(),
            config.comparison_variants.clone(),
            config.comparison_weights.clone(),
        );

        let matching_service = Arc::new(MatchingService::new(
            selector,
            MatchContext {
                travel: travel_service.clone(),
                synonyms: Arc::new(SynonymTable::default()),
            },
            performance.clone(),
            MatchDefaults {
                min_score: config.default_min_score,
                limit: config.default_limit,
                limit_cap: config.limit_cap,
            },
        ));

        let result_store = Arc::new(ResultStore::new(
            db_client.clone(),
            db::cache::RESULT_CACHE_TTL,
            config.large_result_threshold_bytes,
            PathBuf::from(&config.blob_dir),
        ));

        let notifier = Arc::new(WebhookNotifier::new(
            config.webhook_secret.clone(),
            config.webhook_max_retries,
            Duration::from_secs(config.webhook_timeout_s),
        ));

        let queue_service = Arc::new(QueueService::new(
            db_client.clone(),
            matching_service.clone(),
            result_store.clone(),
            notifier,
            Duration::from_secs(config.queue_job_timeout_s),
            config.queue_result_ttl_s,
            config.max_retries,
        ));

        AppState {
            env: config,
            started_at: Instant::now(),
            db_client,
            matching_service,
            travel_service,
            queue_service,
            result_store,
            performance,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .init();

    dotenv().ok();

    let config = Config::init();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    tracing::info!("Connected to the database");

    let db_client = match &config.redis_url {
        Some(redis_url) => DBClient::with_redis(pool, redis_url).await,
        None => DBClient::new(pool),
    };
    db_client.ensure_result_schema().await?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST]);

    let app_state = Arc::new(AppState::new(db_client, config.clone()));

    if app_state.db_client.is_redis_available() {
        app_state.queue_service.spawn_workers(config.queue_workers);
    } else {
        tracing::warn!("Queue workers not started: Redis is unavailable");
    }

    let app = create_router(app_state.clone()).layer(cors);

    tracing::info!("Server is running on http://localhost:{}", config.port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    let queue_service = app_state.queue_service.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received, draining workers");
            queue_service.shutdown();
        })
        .await?;

    Ok(())
}
