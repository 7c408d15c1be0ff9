use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde_json::Value;

use crate::{
    models::{
        candidate::Candidate,
        job::JobPosting,
        matching::{MatchMeta, MatchResponse, MatchResult, MatchStatus},
    },
    service::{
        canonicalizer,
        error::ServiceError,
        fallback::{self, FallbackKind},
        performance::PerformanceMonitor,
        selector::{AlgorithmSelector, SelectorExplanation},
        variants::MatchContext,
        weights,
    },
};

/// Which variant a request asked for. `Auto` defers to the selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlgorithmChoice {
    Auto,
    Comparison,
    Named(String),
}

impl AlgorithmChoice {
    /// Accepts both the short API aliases and the full variant names.
    pub fn parse(raw: Option<&str>) -> AlgorithmChoice {
        let Some(raw) = raw else {
            return AlgorithmChoice::Auto;
        };
        match raw.trim().to_lowercase().as_str() {
            "" | "auto" => AlgorithmChoice::Auto,
            "comparison" => AlgorithmChoice::Comparison,
            "skills" | "skills-centric" => AlgorithmChoice::Named("skills-centric".to_string()),
            "geo" | "geo-aware" => AlgorithmChoice::Named("geo-aware".to_string()),
            other => AlgorithmChoice::Named(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub algorithm: AlgorithmChoice,
    pub limit: usize,
    pub min_score: f64,
    pub include_details: bool,
    pub include_explanations: bool,
    pub track_performance: bool,
    pub enable_fallback: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchDefaults {
    pub min_score: f64,
    pub limit: usize,
    pub limit_cap: usize,
}

impl Default for MatchDefaults {
    fn default() -> Self {
        MatchDefaults {
            min_score: 0.6,
            limit: 10,
            limit_cap: 50,
        }
    }
}

impl MatchDefaults {
    pub fn options(&self) -> MatchOptions {
        MatchOptions {
            algorithm: AlgorithmChoice::Auto,
            limit: self.limit,
            min_score: self.min_score,
            include_details: true,
            include_explanations: true,
            track_performance: true,
            enable_fallback: true,
        }
    }
}

/// Top-level matching pipeline: canonicalize, resolve weights, select
/// and execute a variant, then post-process, filter, sort and truncate.
/// Failures beyond canonicalization degrade through the fallback chain.
pub struct MatchingService {
    selector: AlgorithmSelector,
    ctx: MatchContext,
    performance: Arc<PerformanceMonitor>,
    defaults: MatchDefaults,
}

impl MatchingService {
    pub fn new(
        selector: AlgorithmSelector,
        ctx: MatchContext,
        performance: Arc<PerformanceMonitor>,
        defaults: MatchDefaults,
    ) -> Self {
        MatchingService {
            selector,
            ctx,
            performance,
            defaults,
        }
    }

    pub fn defaults(&self) -> MatchDefaults {
        self.defaults
    }

    pub fn selector(&self) -> &AlgorithmSelector {
        &self.selector
    }

    /// Runs the full pipeline. Only `InvalidInput` surfaces as an
    /// error; any later failure is absorbed into a fallback or error
    /// envelope.
    pub async fn execute(
        &self,
        candidate_raw: &Value,
        jobs_raw: &[Value],
        options: &MatchOptions,
    ) -> Result<MatchResponse, ServiceError> {
        let started = Instant::now();

        let candidate = canonicalizer::canonicalize_candidate(candidate_raw)?;
        let jobs = canonicalizer::canonicalize_jobs(jobs_raw)?;

        let limit = options.limit.clamp(1, self.defaults.limit_cap);

        match self.run_variants(&candidate, &jobs, options).await {
            Ok((algorithm_used, mut results)) => {
                let comparison = options.algorithm == AlgorithmChoice::Comparison;
                self.post_process(&mut results, options, comparison, None);
                finalize(&mut results, options.min_score, limit);

                if options.track_performance {
                    self.performance
                        .track_execution(&algorithm_used, started.elapsed(), results.len());
                }

                Ok(envelope(
                    MatchStatus::Success,
                    algorithm_used,
                    started,
                    results,
                    jobs.len(),
                    Vec::new(),
                ))
            }
            Err(error @ ServiceError::InvalidInput(_)) => Err(error),
            Err(error) if options.enable_fallback => {
                tracing::warn!("Matching failed, degrading: {}", error);
                let kind = fallback::chain_for(error.class())
                    .into_iter()
                    .next()
                    .unwrap_or(FallbackKind::Simple);
                let mut results = fallback::run(kind, &candidate, &jobs, limit);
                self.post_process(&mut results, options, false, Some(kind));
                finalize(&mut results, options.min_score, limit);

                Ok(envelope(
                    MatchStatus::Fallback,
                    format!("fallback-{}", kind.name()),
                    started,
                    results,
                    jobs.len(),
                    vec![error.to_string()],
                ))
            }
            Err(error) => {
                tracing::error!("Matching failed without fallback: {}", error);
                Ok(envelope(
                    MatchStatus::Error,
                    "none".to_string(),
                    started,
                    Vec::new(),
                    jobs.len(),
                    vec![error.to_string()],
                ))
            }
        }
    }

    pub fn explain(
        &self,
        candidate_raw: &Value,
        jobs_raw: &[Value],
    ) -> Result<SelectorExplanation, ServiceError> {
        let candidate = canonicalizer::canonicalize_candidate(candidate_raw)?;
        let jobs = canonicalizer::canonicalize_jobs(jobs_raw)?;
        Ok(self.selector.explain(&candidate, &jobs))
    }

    async fn run_variants(
        &self,
        candidate: &Candidate,
        jobs: &[JobPosting],
        options: &MatchOptions,
    ) -> Result<(String, Vec<MatchResult>), ServiceError> {
        match &options.algorithm {
            AlgorithmChoice::Comparison => self.run_comparison(candidate, jobs).await,
            AlgorithmChoice::Auto => {
                let (variant, reason) = self.selector.select(candidate, jobs);
                tracing::info!("Selected variant '{}': {}", variant.name(), reason);
                let resolved =
                    weights::resolve_weights(&variant.base_weights(), candidate.priorities.as_ref());
                let results = variant.run(&self.ctx, candidate, jobs, &resolved).await?;
                Ok((variant.name().to_string(), results))
            }
            AlgorithmChoice::Named(name) => {
                let variant = self.selector.get(name).ok_or_else(|| {
                    ServiceError::InvalidInput(format!("Unknown algorithm: {}", name))
                })?;
                let resolved =
                    weights::resolve_weights(&variant.base_weights(), candidate.priorities.as_ref());
                let results = variant.run(&self.ctx, candidate, jobs, &resolved).await?;
                Ok((variant.name().to_string(), results))
            }
        }
    }

    /// Comparison mode: the configured variants run concurrently and
    /// their scores aggregate into a weighted mean per job.
    async fn run_comparison(
        &self,
        candidate: &Candidate,
        jobs: &[JobPosting],
    ) -> Result<(String, Vec<MatchResult>), ServiceError> {
        let set = self.selector.comparison_set();
        if set.is_empty() {
            return Err(ServiceError::InvalidInput(
                "No comparison variants configured".to_string(),
            ));
        }

        let runs = set.iter().map(|variant| {
            let resolved =
                weights::resolve_weights(&variant.base_weights(), candidate.priorities.as_ref());
            async move {
                let outcome = variant.run(&self.ctx, candidate, jobs, &resolved).await;
                (variant.name().to_string(), outcome)
            }
        });

        let mut per_variant = Vec::new();
        let mut last_error = None;
        for (name, outcome) in join_all(runs).await {
            match outcome {
                Ok(results) => per_variant.push((name, results)),
                Err(error) => {
                    tracing::warn!("Comparison variant '{}' failed: {}", name, error);
                    last_error = Some(error);
                }
            }
        }

        if per_variant.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                ServiceError::InvalidInput("No comparison variants produced results".to_string())
            }));
        }

        Ok((
            "comparison".to_string(),
            self.selector.aggregate_comparison(per_variant),
        ))
    }

    /// Confidence and detail shaping: base confidence is the score
    /// ratio, bumped for populated details/explanations and comparison
    /// aggregation, then reduced by the fallback factor when degraded.
    fn post_process(
        &self,
        results: &mut Vec<MatchResult>,
        options: &MatchOptions,
        comparison: bool,
        fallback_kind: Option<FallbackKind>,
    ) {
        for result in results.iter_mut() {
            result.global_score = result.global_score.min(100);

            let mut confidence = result.global_score as f64 / 100.0;
            if options.include_details && !result.per_dimension.is_empty() {
                confidence += 0.1;
            }
            if options.include_explanations {
                confidence += 0.05;
            }
            if comparison && result.algorithm_scores.is_some() {
                confidence += 0.05;
            }
            confidence = confidence.min(1.0);

            match fallback_kind {
                Some(FallbackKind::Emergency) => confidence = 0.3,
                Some(kind) => confidence *= kind.confidence_factor(),
                None => {}
            }
            result.confidence = confidence;

            if !options.include_explanations {
                for score in result.per_dimension.values_mut() {
                    score.explanation.clear();
                }
            }
            if !options.include_details {
                result.per_dimension.clear();
            }
        }
    }
}

fn finalize(results: &mut Vec<MatchResult>, min_score: f64, limit: usize) {
    let floor = (min_score * 100.0).round() as u32;
    results.retain(|r| r.global_score >= floor);
    results.sort_by(|a, b| {
        b.global_score.cmp(&a.global_score).then(
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    results.truncate(limit);
}

fn envelope(
    status: MatchStatus,
    algorithm_used: String,
    started: Instant,
    results: Vec<MatchResult>,
    total_offers: usize,
    errors: Vec<String>,
) -> MatchResponse {
    let returned = results.len();
    let (avg_score, avg_confidence) = if returned > 0 {
        (
            results.iter().map(|r| r.global_score as f64).sum::<f64>() / returned as f64,
            results.iter().map(|r| r.confidence).sum::<f64>() / returned as f64,
        )
    } else {
        (0.0, 0.0)
    };

    MatchResponse {
        status,
        algorithm_used,
        execution_time_s: started.elapsed().as_secs_f64(),
        results,
        meta: MatchMeta {
            total_offers,
            returned,
            avg_score: (avg_score * 10.0).round() / 10.0,
            avg_confidence: (avg_confidence * 1000.0).round() / 1000.0,
        },
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::models::matching::{Dimension, WeightVector};
    use crate::service::error::ErrorClass;
    use crate::service::scoring::SynonymTable;
    use crate::service::travel_service::{
        ProviderMode, RouteSource, RoutingError, TravelQuery, TravelTimeService,
        TravelTimeSettings,
    };
    use crate::service::variants::{
        registry, AlgorithmCapabilities, MatchAlgorithm, MatchContext,
    };
    use crate::models::matching::TravelSource;

    fn service_with(
        selector: AlgorithmSelector,
        travel: Arc<TravelTimeService>,
    ) -> MatchingService {
        MatchingService::new(
            selector,
            MatchContext {
                travel,
                synonyms: Arc::new(SynonymTable::default()),
            },
            Arc::new(PerformanceMonitor::new()),
            MatchDefaults::default(),
        )
    }

    fn simulated_travel() -> Arc<TravelTimeService> {
        Arc::new(TravelTimeService::new(
            TravelTimeSettings {
                mode: ProviderMode::Simulated,
                ..Default::default()
            },
            None,
        ))
    }

    fn default_service() -> MatchingService {
        service_with(AlgorithmSelector::with_defaults(), simulated_travel())
    }

    fn senior_python_candidate() -> Value {
        json!({
            "id": "c1",
            "skills": ["Python", "Django", "SQL"],
            "years_experience": 5,
            "location": "Paris",
            "salary_expectation": 55000,
            "contract_types": ["CDI"],
            "transport_preference": "transit",
            "priorities": {"compensation": 9, "proximity": 3}
        })
    }

    fn senior_python_job() -> Value {
        json!({
            "id": "j1",
            "title": "Senior Python",
            "required_skills": ["Python", "Django", "PostgreSQL"],
            "location": "Paris",
            "salary_band": {"min": 50000, "max": 60000},
            "contract_type": "CDI",
            "remote_policy": "onsite"
        })
    }

    #[tokio::test]
    async fn invalid_candidate_is_rejected_before_any_variant_runs() {
        let service = default_service();
        let options = service.defaults().options();
        let error = service
            .execute(&json!({"name": "no skills"}), &[senior_python_job()], &options)
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn strong_match_scores_high_with_dynamic_weights() {
        let service = default_service();
        let options = service.defaults().options();
        let response = service
            .execute(&senior_python_candidate(), &[senior_python_job()], &options)
            .await
            .unwrap();

        assert_eq!(response.status, MatchStatus::Success);
        assert!(
            response.algorithm_used == "comprehensive" || response.algorithm_used == "enhanced",
            "unexpected algorithm {}",
            response.algorithm_used
        );
        assert_eq!(response.results.len(), 1);

        let result = &response.results[0];
        assert!(result.global_score >= 75, "score was {}", result.global_score);

        let salary_weight = result.per_dimension[&Dimension::Salary].weight;
        let proximity_weight = result.per_dimension[&Dimension::Proximity].weight;
        assert!(salary_weight > proximity_weight);

        let skills = &result.per_dimension[&Dimension::Skills];
        assert!(skills.explanation.contains("Python"));
        assert!(skills.explanation.contains("Django"));
    }

    #[tokio::test]
    async fn results_are_sorted_filtered_and_limited() {
        let service = default_service();
        let mut options = service.defaults().options();
        options.min_score = 0.0;
        options.limit = 2;
        options.algorithm = AlgorithmChoice::Named("skills-centric".to_string());

        let jobs = vec![
            json!({"id": "bad", "title": "Chef", "required_skills": ["Cuisine", "Patisserie"]}),
            senior_python_job(),
            json!({"id": "mid", "title": "Data Analyst", "required_skills": ["SQL", "Excel"]}),
        ];
        let response = service
            .execute(&senior_python_candidate(), &jobs, &options)
            .await
            .unwrap();

        assert_eq!(response.results.len(), 2);
        assert!(response.results[0].global_score >= response.results[1].global_score);
        assert_eq!(response.meta.total_offers, 3);
        assert_eq!(response.meta.returned, 2);
    }

    #[tokio::test]
    async fn min_score_filters_low_matches() {
        let service = default_service();
        let mut options = service.defaults().options();
        options.algorithm = AlgorithmChoice::Named("skills-centric".to_string());
        options.min_score = 0.95;

        let response = service
            .execute(
                &json!({"skills": ["Java"]}),
                &[json!({"title": "Go Dev", "required_skills": ["Go", "Rust"]})],
                &options,
            )
            .await
            .unwrap();
        assert!(response.results.is_empty());
        assert_eq!(response.status, MatchStatus::Success);
    }

    #[tokio::test]
    async fn warm_cache_runs_are_identical() {
        let service = default_service();
        let mut options = service.defaults().options();
        options.min_score = 0.0;
        let jobs = vec![senior_python_job(), json!({
            "id": "j2",
            "title": "Python Dev",
            "required_skills": ["Python"],
            "location": "Lyon"
        })];

        let first = service
            .execute(&senior_python_candidate(), &jobs, &options)
            .await
            .unwrap();
        let second = service
            .execute(&senior_python_candidate(), &jobs, &options)
            .await
            .unwrap();

        let ids_first: Vec<&str> = first.results.iter().map(|r| r.job_id.as_str()).collect();
        let ids_second: Vec<&str> = second.results.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids_first, ids_second);
        for (a, b) in first.results.iter().zip(second.results.iter()) {
            assert_eq!(a.global_score, b.global_score);
            assert!((a.confidence - b.confidence).abs() < f64::EPSILON);
        }
    }

    #[tokio::test]
    async fn comparison_mode_aggregates_all_jobs() {
        let service = default_service();
        let mut options = service.defaults().options();
        options.algorithm = AlgorithmChoice::Comparison;
        options.min_score = 0.0;
        options.limit = 50;

        let jobs: Vec<Value> = (0..40)
            .map(|i| {
                json!({
                    "id": format!("j{}", i),
                    "title": "Python Dev",
                    "required_skills": ["Python"],
                    "location": "Paris"
                })
            })
            .collect();

        let response = service
            .execute(&senior_python_candidate(), &jobs, &options)
            .await
            .unwrap();

        assert_eq!(response.algorithm_used, "comparison");
        assert_eq!(response.results.len(), 40);
        for result in &response.results {
            let scores = result.algorithm_scores.as_ref().expect("per-variant scores kept");
            assert!(!scores.is_empty());
            let mean: f64 =
                scores.values().map(|s| *s as f64).sum::<f64>() / scores.len() as f64;
            assert!(
                (result.global_score as f64 - mean).abs() <= 1.0,
                "aggregate {} deviates from mean {}",
                result.global_score,
                mean
            );
        }
    }

    struct FailingSource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl RouteSource for FailingSource {
        async fn fetch(&self, _query: &TravelQuery) -> Result<crate::models::matching::TravelResult, RoutingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RoutingError::Timeout)
        }
    }

    #[tokio::test]
    async fn routing_outage_stays_invisible_to_callers() {
        let travel = Arc::new(TravelTimeService::new(
            TravelTimeSettings {
                mode: ProviderMode::Hybrid,
                circuit_fail_max: 5,
                max_retries: 1,
                ..Default::default()
            },
            Some(Arc::new(FailingSource { calls: AtomicU32::new(0) })),
        ));
        let service = service_with(AlgorithmSelector::with_defaults(), travel.clone());

        let mut options = service.defaults().options();
        options.algorithm = AlgorithmChoice::Named("geo-aware".to_string());
        options.min_score = 0.0;

        let jobs: Vec<Value> = (0..6)
            .map(|i| {
                json!({
                    "id": format!("j{}", i),
                    "title": "Python Dev",
                    "required_skills": ["Python"],
                    "location": format!("City {}", i),
                    "remote_policy": "onsite"
                })
            })
            .collect();

        let candidate = json!({
            "skills": ["Python"],
            "location": "Paris",
            "remote_preference": "onsite"
        });

        let response = service.execute(&candidate, &jobs, &options).await.unwrap();
        assert_eq!(response.status, MatchStatus::Success);
        for result in &response.results {
            let travel_info = result.travel_info.as_ref().expect("travel info present");
            assert_eq!(travel_info.source, TravelSource::Simulated);
        }
        assert!(travel.breaker_is_open());
    }

    struct RaisingVariant;

    #[async_trait]
    impl MatchAlgorithm for RaisingVariant {
        fn name(&self) -> &'static str {
            "raising"
        }
        fn capabilities(&self) -> AlgorithmCapabilities {
            AlgorithmCapabilities {
                handles_geolocation: false,
                handles_soft_skills: false,
                handles_priorities: false,
                handles_remote: false,
                performance_score: 0.5,
            }
        }
        fn base_weights(&self) -> WeightVector {
            WeightVector::from_pairs(&[(Dimension::Skills, 1.0)])
        }
        fn supports(&self, _c: &Candidate, _j: &[JobPosting]) -> bool {
            true
        }
        async fn run(
            &self,
            _ctx: &MatchContext,
            _candidate: &Candidate,
            _jobs: &[JobPosting],
            _weights: &WeightVector,
        ) -> Result<Vec<MatchResult>, ServiceError> {
            Err(ServiceError::AlgorithmFault {
                algorithm: "raising".to_string(),
                message: "synthetic failure".to_string(),
                class: ErrorClass::Unknown,
            })
        }
    }

    #[tokio::test]
    async fn variant_failure_triggers_the_fallback_chain() {
        let mut variants = registry();
        variants.push(Arc::new(RaisingVariant));
        let selector = AlgorithmSelector::new(variants, vec![], HashMap::new());
        let service = service_with(selector, simulated_travel());

        let mut options = service.defaults().options();
        options.algorithm = AlgorithmChoice::Named("raising".to_string());
        options.min_score = 0.0;

        let response = service
            .execute(&senior_python_candidate(), &[senior_python_job()], &options)
            .await
            .unwrap();

        assert_eq!(response.status, MatchStatus::Fallback);
        assert!(response.algorithm_used.starts_with("fallback-"));
        assert_eq!(response.errors.len(), 1);
        assert!(!response.results.is_empty());
        for result in &response.results {
            assert!(result.fallback_used);
            // Would-be confidence caps at 1.0, so the degraded value
            // never exceeds the 0.8 factor.
            assert!(result.confidence <= 0.8 + f64::EPSILON);
        }
    }

    #[tokio::test]
    async fn fallback_disabled_returns_error_envelope() {
        let mut variants = registry();
        variants.push(Arc::new(RaisingVariant));
        let selector = AlgorithmSelector::new(variants, vec![], HashMap::new());
        let service = service_with(selector, simulated_travel());

        let mut options = service.defaults().options();
        options.algorithm = AlgorithmChoice::Named("raising".to_string());
        options.enable_fallback = false;

        let response = service
            .execute(&senior_python_candidate(), &[senior_python_job()], &options)
            .await
            .unwrap();

        assert_eq!(response.status, MatchStatus::Error);
        assert_eq!(response.algorithm_used, "none");
        assert!(response.results.is_empty());
        assert!(!response.errors.is_empty());
    }

    #[tokio::test]
    async fn unknown_named_algorithm_is_invalid_input() {
        let service = default_service();
        let mut options = service.defaults().options();
        options.algorithm = AlgorithmChoice::Named("does-not-exist".to_string());
        let error = service
            .execute(&senior_python_candidate(), &[senior_python_job()], &options)
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn remote_candidate_and_remote_job_score_high() {
        let service = default_service();
        let mut options = service.defaults().options();
        options.min_score = 0.0;

        let candidate = json!({
            "skills": ["Python", "SQL"],
            "years_experience": 2,
            "location": "Lyon",
            "remote_preference": "remote"
        });
        let job = json!({
            "id": "j1",
            "title": "Remote Python",
            "required_skills": ["Python", "SQL"],
            "location": "Paris",
            "remote_policy": "remote"
        });

        let response = service.execute(&candidate, &[job], &options).await.unwrap();
        let result = &response.results[0];
        if let Some(proximity) = result.per_dimension.get(&Dimension::Proximity) {
            assert!(proximity.value >= 0.95);
        }
        assert!(result.global_score >= 80, "score was {}", result.global_score);
    }

    #[tokio::test]
    async fn weak_skills_stay_low_and_use_skills_centric() {
        let service = default_service();
        let mut options = service.defaults().options();
        options.min_score = 0.0;

        let response = service
            .execute(
                &json!({"skills": ["Java"]}),
                &[json!({"title": "Backend Dev", "required_skills": ["Python", "Go"], "location": "Paris"})],
                &options,
            )
            .await
            .unwrap();

        assert_eq!(response.algorithm_used, "skills-centric");
        let result = &response.results[0];
        let skills = &result.per_dimension[&Dimension::Skills];
        assert!(skills.value <= 0.25, "skills value {}", skills.value);
        assert!(result.global_score < 60, "score was {}", result.global_score);
    }
}
