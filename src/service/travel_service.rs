use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};

use crate::{
    models::{
        candidate::TransportMode,
        matching::{TransitLeg, TravelOutcome, TravelResult, TravelSource},
    },
    service::resilience::{retry_with_backoff, CircuitBreaker},
    utils::geo,
};

/// Operating mode of the provider. Hybrid (the default) is the only
/// mode with full result availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    Real,
    Simulated,
    Hybrid,
}

impl ProviderMode {
    pub fn from_str(raw: &str) -> ProviderMode {
        match raw.trim().to_lowercase().as_str() {
            "real" => ProviderMode::Real,
            "simulated" => ProviderMode::Simulated,
            _ => ProviderMode::Hybrid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TravelQuery {
    pub origin: String,
    pub destination: String,
    pub mode: TransportMode,
    pub departure_time: Option<String>,
}

impl TravelQuery {
    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        mode: TransportMode,
        departure_time: Option<String>,
    ) -> Self {
        TravelQuery {
            origin: origin.into(),
            destination: destination.into(),
            mode,
            departure_time,
        }
    }

    /// Cache key over `(origin, destination, mode, departure bucket)`.
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.origin,
            self.destination,
            self.mode.api_mode(),
            self.departure_time.as_deref().unwrap_or("now")
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("routing API timeout")]
    Timeout,
    #[error("routing API network error: {0}")]
    Network(String),
    #[error("routing API server error: HTTP {0}")]
    ServerStatus(u16),
    #[error("routing API client error: HTTP {0}")]
    ClientStatus(u16),
    #[error("routing API returned status {0}")]
    NotOk(String),
}

impl RoutingError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RoutingError::Timeout | RoutingError::Network(_) | RoutingError::ServerStatus(_)
        )
    }
}

/// Seam over the external routing API so the cache and fallback logic
/// can be exercised against a fake in tests.
#[async_trait]
pub trait RouteSource: Send + Sync {
    async fn fetch(&self, query: &TravelQuery) -> Result<TravelResult, RoutingError>;
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    #[serde(default)]
    legs: Vec<DirectionsLeg>,
}

#[derive(Debug, Deserialize)]
struct DirectionsLeg {
    duration: TextValue,
    distance: TextValue,
    #[serde(default)]
    steps: Vec<DirectionsStep>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: i64,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct DirectionsStep {
    #[serde(default)]
    travel_mode: String,
    transit_details: Option<TransitDetails>,
}

#[derive(Debug, Deserialize)]
struct TransitDetails {
    line: Option<TransitLine>,
}

#[derive(Debug, Deserialize)]
struct TransitLine {
    short_name: Option<String>,
    vehicle: Option<TransitVehicle>,
}

#[derive(Debug, Deserialize)]
struct TransitVehicle {
    #[serde(rename = "type")]
    vehicle_type: Option<String>,
}

/// Thin client over the external directions API.
pub struct RoutingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RoutingClient {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        RoutingClient { http, base_url, api_key }
    }

    fn departure_param(departure_time: &str) -> Option<String> {
        let mut parts = departure_time.split(':');
        let hour: u64 = parts.next()?.parse().ok()?;
        let minute: u64 = parts.next()?.parse().ok()?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        Some((now + hour * 3600 + minute * 60).to_string())
    }
}

#[async_trait]
impl RouteSource for RoutingClient {
    async fn fetch(&self, query: &TravelQuery) -> Result<TravelResult, RoutingError> {
        let mut params = vec![
            ("origin".to_string(), query.origin.clone()),
            ("destination".to_string(), query.destination.clone()),
            ("mode".to_string(), query.mode.api_mode().to_string()),
            ("key".to_string(), self.api_key.clone()),
            ("language".to_string(), "fr".to_string()),
            ("region".to_string(), "FR".to_string()),
        ];
        if query.mode == TransportMode::Transit {
            if let Some(param) = query.departure_time.as_deref().and_then(Self::departure_param) {
                params.push(("departure_time".to_string(), param));
            }
        }

        let response = self
            .http
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RoutingError::Timeout
                } else {
                    RoutingError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(RoutingError::ServerStatus(status.as_u16()));
        }
        if status.is_client_error() {
            return Err(RoutingError::ClientStatus(status.as_u16()));
        }

        let body: DirectionsResponse = response
            .json()
            .await
            .map_err(|e| RoutingError::Network(e.to_string()))?;

        if body.status != "OK" || body.routes.is_empty() {
            return Err(RoutingError::NotOk(body.status));
        }

        let leg = body
            .routes
            .into_iter()
            .next()
            .and_then(|route| route.legs.into_iter().next())
            .ok_or_else(|| RoutingError::NotOk("EMPTY_ROUTE".to_string()))?;

        let duration_minutes = (leg.duration.value / 60).max(0) as u32;
        let distance_km = leg.distance.value as f64 / 1000.0;

        let transit_legs = if query.mode == TransportMode::Transit {
            let legs: Vec<TransitLeg> = leg
                .steps
                .iter()
                .filter(|step| step.travel_mode == "TRANSIT")
                .filter_map(|step| {
                    let line = step.transit_details.as_ref()?.line.as_ref()?;
                    Some(TransitLeg {
                        line: line.short_name.clone().unwrap_or_default(),
                        vehicle: line
                            .vehicle
                            .as_ref()
                            .and_then(|v| v.vehicle_type.clone())
                            .unwrap_or_default(),
                    })
                })
                .collect();
            if legs.is_empty() { None } else { Some(legs) }
        } else {
            None
        };

        let summary = if leg.duration.text.is_empty() {
            format!("{} min {}", duration_minutes, query.mode.label())
        } else {
            format!("{} {}", leg.duration.text, query.mode.label())
        };

        Ok(TravelResult {
            duration_minutes,
            distance_km,
            mode: query.mode,
            source: TravelSource::Real,
            summary,
            transit_legs,
        })
    }
}

struct CacheEntry {
    result: TravelResult,
    inserted_at: Instant,
}

#[derive(Debug, Serialize, Clone)]
pub struct TravelStats {
    pub api_calls: u64,
    pub cache_hits: u64,
    pub simulated_fallbacks: u64,
    pub cache_entries: usize,
    pub breaker_state: String,
}

/// Travel-time lookups with a TTL cache, a circuit breaker and an
/// automatic simulated fallback. The service never blocks indefinitely
/// and never errors: callers get `Unavailable` only when both the real
/// and simulated paths are disabled.
pub struct TravelTimeService {
    mode: ProviderMode,
    source: Option<Arc<dyn RouteSource>>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    cache_ttl: Duration,
    cache_max_entries: usize,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    semaphore: Arc<Semaphore>,
    breaker: CircuitBreaker,
    max_retries: u32,
    api_calls: AtomicU64,
    cache_hits: AtomicU64,
    simulated_fallbacks: AtomicU64,
}

pub struct TravelTimeSettings {
    pub mode: ProviderMode,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub max_concurrency: usize,
    pub circuit_fail_max: u32,
    pub circuit_reset: Duration,
    pub max_retries: u32,
}

impl Default for TravelTimeSettings {
    fn default() -> Self {
        TravelTimeSettings {
            mode: ProviderMode::Hybrid,
            cache_ttl: Duration::from_secs(3600),
            cache_max_entries: 5000,
            max_concurrency: 8,
            circuit_fail_max: 5,
            circuit_reset: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

impl TravelTimeService {
    pub fn new(settings: TravelTimeSettings, source: Option<Arc<dyn RouteSource>>) -> Self {
        if source.is_none() && settings.mode != ProviderMode::Simulated {
            tracing::warn!("No routing client configured, travel lookups will be simulated");
        }
        TravelTimeService {
            mode: settings.mode,
            source,
            cache: RwLock::new(HashMap::new()),
            cache_ttl: settings.cache_ttl,
            cache_max_entries: settings.cache_max_entries.max(1),
            inflight: Mutex::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(settings.max_concurrency.max(1))),
            breaker: CircuitBreaker::new(settings.circuit_fail_max, settings.circuit_reset),
            max_retries: settings.max_retries,
            api_calls: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            simulated_fallbacks: AtomicU64::new(0),
        }
    }

    /// Resolves a travel query through cache, the real API and the
    /// simulated estimator, in that order.
    pub async fn travel_time(&self, query: &TravelQuery) -> TravelOutcome {
        let key = query.cache_key();

        if let Some(result) = self.cache_get(&key) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return TravelOutcome::Found(result);
        }

        // Single-flight per key: concurrent identical queries wait on
        // the first caller's lookup instead of hitting the API.
        let guard = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let locked = guard.lock().await;

        let outcome = if let Some(result) = self.cache_get(&key) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            TravelOutcome::Found(result)
        } else {
            let resolved = self.resolve(query).await;
            if let TravelOutcome::Found(result) = &resolved {
                self.cache_insert(&key, result.clone());
            }
            resolved
        };

        drop(locked);
        let mut inflight = self.inflight.lock().await;
        if let Some(entry) = inflight.get(&key) {
            if Arc::strong_count(entry) <= 2 {
                inflight.remove(&key);
            }
        }

        outcome
    }

    async fn resolve(&self, query: &TravelQuery) -> TravelOutcome {
        match self.mode {
            ProviderMode::Simulated => TravelOutcome::Found(self.simulate(query)),
            ProviderMode::Real | ProviderMode::Hybrid => match self.fetch_real(query).await {
                Ok(result) => TravelOutcome::Found(result),
                Err(error) => {
                    tracing::debug!(
                        "Real travel lookup failed for {} -> {}: {}",
                        query.origin,
                        query.destination,
                        error
                    );
                    if self.mode == ProviderMode::Hybrid {
                        self.simulated_fallbacks.fetch_add(1, Ordering::Relaxed);
                        TravelOutcome::Found(self.simulate(query))
                    } else {
                        TravelOutcome::Unavailable
                    }
                }
            },
        }
    }

    async fn fetch_real(&self, query: &TravelQuery) -> Result<TravelResult, RoutingError> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| RoutingError::Network("no routing client configured".to_string()))?;

        if !self.breaker.try_acquire() {
            return Err(RoutingError::Network("circuit breaker open".to_string()));
        }

        let _permit = self.semaphore.acquire().await.map_err(|_| {
            RoutingError::Network("external-call semaphore closed".to_string())
        })?;

        self.api_calls.fetch_add(1, Ordering::Relaxed);
        let result = retry_with_backoff(self.max_retries, RoutingError::is_transient, || {
            source.fetch(query)
        })
        .await;

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        result
    }

    /// Deterministic estimator: distance from the city table (or an
    /// edit-distance heuristic), per-mode speed and overhead. Always
    /// returns a plausible positive duration.
    pub fn simulate(&self, query: &TravelQuery) -> TravelResult {
        let distance_km = geo::estimate_distance_km(&query.origin, &query.destination);
        let (speed_kmh, overhead_min) = match query.mode {
            TransportMode::Driving => (55.0, 10.0),
            TransportMode::Transit => (35.0, 15.0),
            TransportMode::Cycling => (15.0, 5.0),
            TransportMode::Walking => (5.0, 0.0),
        };
        let duration_minutes = ((distance_km / speed_kmh) * 60.0 + overhead_min).round().max(1.0) as u32;
        TravelResult {
            duration_minutes,
            distance_km,
            mode: query.mode,
            source: TravelSource::Simulated,
            summary: format!("{} min {} (estimated)", duration_minutes, query.mode.label()),
            transit_legs: None,
        }
    }

    fn cache_get(&self, key: &str) -> Option<TravelResult> {
        let cache = self.cache.read().unwrap();
        cache
            .get(key)
            .filter(|entry| entry.inserted_at.elapsed() < self.cache_ttl)
            .map(|entry| entry.result.clone())
    }

    fn cache_insert(&self, key: &str, result: TravelResult) {
        let mut cache = self.cache.write().unwrap();
        if cache.len() >= self.cache_max_entries && !cache.contains_key(key) {
            let oldest = cache
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest_key) = oldest {
                cache.remove(&oldest_key);
            }
        }
        cache.insert(
            key.to_string(),
            CacheEntry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn usage_stats(&self) -> TravelStats {
        TravelStats {
            api_calls: self.api_calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            simulated_fallbacks: self.simulated_fallbacks.load(Ordering::Relaxed),
            cache_entries: self.cache.read().unwrap().len(),
            breaker_state: self.breaker.state_name().to_string(),
        }
    }

    pub fn breaker_is_open(&self) -> bool {
        self.breaker.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingSource {
        calls: AtomicU32,
        fail: bool,
    }

    impl CountingSource {
        fn new(fail: bool) -> Self {
            CountingSource { calls: AtomicU32::new(0), fail }
        }
    }

    #[async_trait]
    impl RouteSource for CountingSource {
        async fn fetch(&self, query: &TravelQuery) -> Result<TravelResult, RoutingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RoutingError::Timeout);
            }
            Ok(TravelResult {
                duration_minutes: 25,
                distance_km: 17.0,
                mode: query.mode,
                source: TravelSource::Real,
                summary: "25 min by car".to_string(),
                transit_legs: None,
            })
        }
    }

    fn settings(mode: ProviderMode) -> TravelTimeSettings {
        TravelTimeSettings {
            mode,
            max_retries: 1,
            ..Default::default()
        }
    }

    fn query() -> TravelQuery {
        TravelQuery::new("Paris", "Versailles", TransportMode::Driving, None)
    }

    #[tokio::test]
    async fn cache_hit_skips_the_routing_api() {
        let source = Arc::new(CountingSource::new(false));
        let service = TravelTimeService::new(settings(ProviderMode::Real), Some(source.clone()));

        let first = service.travel_time(&query()).await;
        let second = service.travel_time(&query()).await;

        assert!(matches!(first, TravelOutcome::Found(_)));
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.usage_stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn hybrid_mode_always_returns_a_result() {
        let source = Arc::new(CountingSource::new(true));
        let service = TravelTimeService::new(settings(ProviderMode::Hybrid), Some(source));

        match service.travel_time(&query()).await {
            TravelOutcome::Found(result) => {
                assert_eq!(result.source, TravelSource::Simulated);
                assert!(result.duration_minutes > 0);
            }
            TravelOutcome::Unavailable => panic!("hybrid mode must never be unavailable"),
        }
    }

    #[tokio::test]
    async fn real_only_mode_reports_unavailable_on_failure() {
        let source = Arc::new(CountingSource::new(true));
        let service = TravelTimeService::new(settings(ProviderMode::Real), Some(source));
        assert_eq!(service.travel_time(&query()).await, TravelOutcome::Unavailable);
    }

    #[tokio::test]
    async fn breaker_opens_after_consecutive_failures() {
        let source = Arc::new(CountingSource::new(true));
        let service = TravelTimeService::new(
            TravelTimeSettings {
                mode: ProviderMode::Hybrid,
                circuit_fail_max: 5,
                max_retries: 1,
                ..Default::default()
            },
            Some(source.clone()),
        );

        for i in 0..5 {
            let q = TravelQuery::new(format!("Origin {}", i), "Paris", TransportMode::Driving, None);
            let outcome = service.travel_time(&q).await;
            assert!(matches!(outcome, TravelOutcome::Found(_)));
        }
        assert!(service.breaker_is_open());

        // Short-circuited call still served by the estimator, without
        // touching the API again.
        let before = source.calls.load(Ordering::SeqCst);
        let q = TravelQuery::new("Somewhere Else", "Paris", TransportMode::Driving, None);
        assert!(matches!(service.travel_time(&q).await, TravelOutcome::Found(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn simulated_mode_is_deterministic() {
        let service = TravelTimeService::new(settings(ProviderMode::Simulated), None);
        let a = service.travel_time(&query()).await;
        let b = service.travel_time(&query()).await;
        assert_eq!(a, b);
        if let TravelOutcome::Found(result) = a {
            assert_eq!(result.source, TravelSource::Simulated);
        }
    }

    #[tokio::test]
    async fn walking_takes_longer_than_driving() {
        let service = TravelTimeService::new(settings(ProviderMode::Simulated), None);
        let drive = service.simulate(&TravelQuery::new("Paris", "Versailles", TransportMode::Driving, None));
        let walk = service.simulate(&TravelQuery::new("Paris", "Versailles", TransportMode::Walking, None));
        assert!(walk.duration_minutes > drive.duration_minutes);
    }

    #[tokio::test]
    async fn cache_evicts_oldest_when_full() {
        let service = TravelTimeService::new(
            TravelTimeSettings {
                mode: ProviderMode::Simulated,
                cache_max_entries: 2,
                ..Default::default()
            },
            None,
        );
        for city in ["Lyon", "Nantes", "Lille"] {
            let q = TravelQuery::new("Paris", city, TransportMode::Driving, None);
            service.travel_time(&q).await;
        }
        assert_eq!(service.usage_stats().cache_entries, 2);
    }
}
