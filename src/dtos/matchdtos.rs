use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::service::matching_service::{AlgorithmChoice, MatchDefaults, MatchOptions};

/// Raw matching request: candidate and jobs stay free-form until the
/// canonicalizer sees them; only the options are validated here.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct MatchRequestDto {
    pub candidate: Value,

    #[validate(length(min = 1, message = "At least one job posting is required"))]
    pub jobs: Vec<Value>,

    #[validate]
    pub options: Option<MatchOptionsDto>,
}

#[derive(Debug, Deserialize, Serialize, Validate, Default, Clone)]
pub struct MatchOptionsDto {
    pub algorithm: Option<String>,

    #[validate(range(min = 1, max = 50, message = "Limit must be between 1 and 50"))]
    pub limit: Option<usize>,

    #[validate(range(min = 0.0, max = 1.0, message = "min_score must be between 0 and 1"))]
    pub min_score: Option<f64>,

    pub details: Option<bool>,
    pub explanations: Option<bool>,
    pub track_performance: Option<bool>,
    pub enable_fallback: Option<bool>,
}

impl MatchOptionsDto {
    /// Resolves request options over the configured defaults.
    pub fn into_options(self, defaults: MatchDefaults) -> MatchOptions {
        let mut options = defaults.options();
        options.algorithm = AlgorithmChoice::parse(self.algorithm.as_deref());
        if let Some(limit) = self.limit {
            options.limit = limit.min(defaults.limit_cap);
        }
        if let Some(min_score) = self.min_score {
            options.min_score = min_score;
        }
        if let Some(details) = self.details {
            options.include_details = details;
        }
        if let Some(explanations) = self.explanations {
            options.include_explanations = explanations;
        }
        if let Some(track) = self.track_performance {
            options.track_performance = track;
        }
        if let Some(fallback) = self.enable_fallback {
            options.enable_fallback = fallback;
        }
        options
    }
}

#[derive(Debug, Serialize)]
pub struct AlgorithmInfoDto {
    pub name: String,
    pub capabilities: crate::service::variants::AlgorithmCapabilities,
}

#[derive(Debug, Serialize)]
pub struct HealthResponseDto {
    pub status: String,
    pub uptime_s: u64,
    pub version: String,
    pub algorithms_available: Vec<String>,
    pub cache_status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_resolve_over_defaults() {
        let dto = MatchOptionsDto {
            algorithm: Some("geo".to_string()),
            limit: Some(5),
            min_score: Some(0.3),
            details: Some(false),
            ..Default::default()
        };
        let options = dto.into_options(MatchDefaults::default());
        assert_eq!(options.algorithm, AlgorithmChoice::Named("geo-aware".to_string()));
        assert_eq!(options.limit, 5);
        assert_eq!(options.min_score, 0.3);
        assert!(!options.include_details);
        assert!(options.include_explanations);
        assert!(options.enable_fallback);
    }

    #[test]
    fn empty_options_keep_defaults() {
        let options = MatchOptionsDto::default().into_options(MatchDefaults::default());
        assert_eq!(options.algorithm, AlgorithmChoice::Auto);
        assert_eq!(options.limit, 10);
        assert_eq!(options.min_score, 0.6);
    }

    #[test]
    fn limit_is_capped_by_config() {
        let dto = MatchOptionsDto {
            limit: Some(50),
            ..Default::default()
        };
        let defaults = MatchDefaults {
            limit_cap: 20,
            ..Default::default()
        };
        let options = dto.into_options(defaults);
        assert_eq!(options.limit, 20);
    }
}
