// config.rs
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    // Redis (hot tier + queue), optional
    pub redis_url: Option<String>,
    pub redis_enabled: bool,
    // Travel-time provider
    pub travel_provider_mode: String,
    pub travel_api_url: String,
    pub travel_api_key: String,
    pub travel_cache_ttl_s: u64,
    pub travel_cache_max_entries: usize,
    pub travel_timeout_s: u64,
    pub travel_concurrency: usize,
    // Resilience
    pub circuit_fail_max: u32,
    pub circuit_reset_s: u64,
    pub max_retries: u32,
    // Queue & workers
    pub queue_workers: usize,
    pub queue_job_timeout_s: u64,
    pub queue_result_ttl_s: usize,
    // Result store
    pub large_result_threshold_bytes: usize,
    pub blob_dir: String,
    // Webhooks
    pub webhook_secret: String,
    pub webhook_max_retries: u32,
    pub webhook_timeout_s: u64,
    // Matching defaults
    pub default_min_score: f64,
    pub default_limit: usize,
    pub limit_cap: usize,
    pub comparison_variants: Vec<String>,
    pub comparison_weights: std::collections::HashMap<String, f64>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let redis_url = std::env::var("REDIS_URL").ok();
        let redis_enabled = redis_url.is_some();

        let travel_provider_mode = std::env::var("TRAVEL_PROVIDER_MODE")
            .unwrap_or_else(|_| "hybrid".to_string());
        let travel_api_url = std::env::var("TRAVEL_API_URL").unwrap_or_else(|_| {
            "https://maps.googleapis.com/maps/api/directions/json".to_string()
        });
        let travel_api_key = std::env::var("TRAVEL_API_KEY").unwrap_or_default();

        let comparison_variants = std::env::var("COMPARISON_VARIANTS")
            .unwrap_or_else(|_| "enhanced,geo-aware,comprehensive".to_string())
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        // "enhanced:0.4,geo-aware:0.3" - unlisted variants weigh 1.0.
        let comparison_weights = std::env::var("COMPARISON_WEIGHTS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|pair| {
                let (name, weight) = pair.split_once(':')?;
                let weight: f64 = weight.trim().parse().ok()?;
                Some((name.trim().to_string(), weight))
            })
            .collect();

        if redis_enabled {
            tracing::info!("Redis caching and queueing are enabled");
        } else {
            tracing::warn!("Redis is disabled (set REDIS_URL to enable the hot tier and the queue)");
        }

        Config {
            database_url,
            port: env_or("PORT", 8000),
            redis_url,
            redis_enabled,
            travel_provider_mode,
            travel_api_url,
            travel_api_key,
            travel_cache_ttl_s: env_or("TRAVEL_CACHE_TTL_S", 3600),
            travel_cache_max_entries: env_or("TRAVEL_CACHE_MAX_ENTRIES", 5000),
            travel_timeout_s: env_or("TRAVEL_TIMEOUT_S", 5),
            travel_concurrency: env_or("TRAVEL_CONCURRENCY", 8),
            circuit_fail_max: env_or("CIRCUIT_FAIL_MAX", 5),
            circuit_reset_s: env_or("CIRCUIT_RESET_S", 30),
            max_retries: env_or("MAX_RETRIES", 3),
            queue_workers: env_or("QUEUE_WORKERS", 2),
            queue_job_timeout_s: env_or("QUEUE_JOB_TIMEOUT_S", 3600),
            queue_result_ttl_s: env_or("QUEUE_RESULT_TTL_S", 86400),
            large_result_threshold_bytes: env_or("LARGE_RESULT_THRESHOLD_BYTES", 102400),
            blob_dir: std::env::var("BLOB_DIR").unwrap_or_else(|_| "./data".to_string()),
            webhook_secret: std::env::var("WEBHOOK_SECRET").unwrap_or_default(),
            webhook_max_retries: env_or("WEBHOOK_MAX_RETRIES", 3),
            webhook_timeout_s: env_or("WEBHOOK_TIMEOUT_S", 10),
            default_min_score: env_or("DEFAULT_MIN_SCORE", 0.6),
            default_limit: env_or("DEFAULT_LIMIT", 10),
            limit_cap: env_or("LIMIT_CAP", 50),
            comparison_variants,
            comparison_weights,
        }
    }
}
