use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::{
    models::{
        candidate::{Candidate, RemotePreference},
        job::JobPosting,
        matching::MatchResult,
    },
    service::variants::{registry, AlgorithmCapabilities, MatchAlgorithm},
};

#[derive(Debug, Serialize, Clone)]
pub struct AlternativeAssessment {
    pub name: String,
    pub would_work: bool,
    pub confidence: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct SelectorExplanation {
    pub chosen: String,
    pub rule_fired: String,
    pub capabilities: AlgorithmCapabilities,
    pub alternatives: Vec<AlternativeAssessment>,
}

/// Rule-based variant selection with a fixed priority order; the first
/// rule whose predicate holds wins.
pub struct AlgorithmSelector {
    variants: Vec<Arc<dyn MatchAlgorithm>>,
    comparison_variants: Vec<String>,
    comparison_weights: HashMap<String, f64>,
}

impl AlgorithmSelector {
    pub fn new(
        variants: Vec<Arc<dyn MatchAlgorithm>>,
        comparison_variants: Vec<String>,
        comparison_weights: HashMap<String, f64>,
    ) -> Self {
        AlgorithmSelector {
            variants,
            comparison_variants,
            comparison_weights,
        }
    }

    pub fn with_defaults() -> Self {
        AlgorithmSelector::new(
            registry(),
            vec![
                "enhanced".to_string(),
                "geo-aware".to_string(),
                "comprehensive".to_string(),
            ],
            HashMap::new(),
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MatchAlgorithm>> {
        self.variants.iter().find(|a| a.name() == name).cloned()
    }

    pub fn all(&self) -> &[Arc<dyn MatchAlgorithm>] {
        &self.variants
    }

    /// Variants executed in comparison mode, in configured order.
    pub fn comparison_set(&self) -> Vec<Arc<dyn MatchAlgorithm>> {
        self.comparison_variants
            .iter()
            .filter_map(|name| self.get(name))
            .collect()
    }

    fn comparison_weight(&self, name: &str) -> f64 {
        self.comparison_weights.get(name).copied().unwrap_or(1.0)
    }

    pub fn select(&self, candidate: &Candidate, jobs: &[JobPosting]) -> (Arc<dyn MatchAlgorithm>, String) {
        for (name, reason) in self.decision_order(candidate, jobs) {
            if let Some(variant) = self.get(name) {
                return (variant, reason.to_string());
            }
        }
        // The decision order always ends with a universally applicable
        // rule; reaching this point means the registry lacks it.
        let fallback = self
            .variants
            .first()
            .cloned()
            .unwrap_or_else(|| Arc::new(crate::service::variants::SkillsCentric) as Arc<dyn MatchAlgorithm>);
        (fallback, "default variant".to_string())
    }

    fn decision_order(&self, candidate: &Candidate, jobs: &[JobPosting]) -> Vec<(&'static str, &'static str)> {
        let mut order = Vec::new();
        if candidate.has_priorities() && (both_locations(candidate, jobs) || culture_signals(candidate, jobs)) {
            order.push((
                "comprehensive",
                "Explicit priorities with rich location or culture data",
            ));
        }
        if culture_signals(candidate, jobs) {
            order.push(("enhanced", "Soft skills or culture preferences present"));
        }
        if both_locations(candidate, jobs) && remote_expressed(candidate, jobs) {
            order.push(("geo-aware", "Locations on both sides and remote preferences expressed"));
        }
        order.push(("skills-centric", "Minimal data, skill-focused matching"));
        order
    }

    /// Diagnostic view: which rule fired and how the alternatives would
    /// have fared.
    pub fn explain(&self, candidate: &Candidate, jobs: &[JobPosting]) -> SelectorExplanation {
        let (chosen, rule_fired) = self.select(candidate, jobs);

        let needs_geo = both_locations(candidate, jobs);
        let needs_soft = culture_signals(candidate, jobs);
        let needs_priorities = candidate.has_priorities();

        let alternatives = self
            .variants
            .iter()
            .filter(|variant| variant.name() != chosen.name())
            .map(|variant| {
                let capabilities = variant.capabilities();
                let mut confidence = capabilities.performance_score;
                let mut would_work = variant.supports(candidate, jobs);

                if needs_geo {
                    confidence += if capabilities.handles_geolocation { 0.1 } else { -0.2 };
                    would_work = would_work && capabilities.handles_geolocation;
                }
                if needs_soft {
                    confidence += if capabilities.handles_soft_skills { 0.1 } else { -0.1 };
                    would_work = would_work && capabilities.handles_soft_skills;
                }
                if needs_priorities && !capabilities.handles_priorities {
                    confidence -= 0.1;
                }

                AlternativeAssessment {
                    name: variant.name().to_string(),
                    would_work,
                    confidence: confidence.clamp(0.0, 1.0),
                }
            })
            .collect();

        SelectorExplanation {
            chosen: chosen.name().to_string(),
            rule_fired,
            capabilities: chosen.capabilities(),
            alternatives,
        }
    }

    /// Aggregates comparison-mode outputs: per job id, the weighted
    /// mean of each variant's global score. Per-variant scores are kept
    /// for diagnostics.
    pub fn aggregate_comparison(
        &self,
        per_variant: Vec<(String, Vec<MatchResult>)>,
    ) -> Vec<MatchResult> {
        struct Accumulator {
            base: MatchResult,
            weighted_sum: f64,
            weight_total: f64,
            per_algorithm: HashMap<String, u32>,
        }

        let mut order: Vec<String> = Vec::new();
        let mut accumulators: HashMap<String, Accumulator> = HashMap::new();

        for (variant_name, results) in per_variant {
            let weight = self.comparison_weight(&variant_name);
            for result in results {
                let entry = accumulators.entry(result.job_id.clone());
                let entry = match entry {
                    std::collections::hash_map::Entry::Occupied(o) => o.into_mut(),
                    std::collections::hash_map::Entry::Vacant(v) => {
                        order.push(result.job_id.clone());
                        v.insert(Accumulator {
                            base: result.clone(),
                            weighted_sum: 0.0,
                            weight_total: 0.0,
                            per_algorithm: HashMap::new(),
                        })
                    }
                };
                entry.weighted_sum += result.global_score as f64 * weight;
                entry.weight_total += weight;
                entry.per_algorithm.insert(variant_name.clone(), result.global_score);
            }
        }

        order
            .into_iter()
            .filter_map(|job_id| accumulators.remove(&job_id))
            .map(|acc| {
                let mut aggregated = acc.base;
                if acc.weight_total > 0.0 {
                    aggregated.global_score =
                        (acc.weighted_sum / acc.weight_total).round().clamp(0.0, 100.0) as u32;
                }
                aggregated.algorithm_used = "comparison".to_string();
                aggregated.algorithm_scores = Some(acc.per_algorithm);
                aggregated
            })
            .collect()
    }
}

fn both_locations(candidate: &Candidate, jobs: &[JobPosting]) -> bool {
    candidate.location.is_some() && jobs.iter().any(|j| j.location.is_some())
}

fn culture_signals(candidate: &Candidate, jobs: &[JobPosting]) -> bool {
    !candidate.soft_skills.is_empty()
        || !candidate.values.is_empty()
        || !candidate.culture_preferences.is_empty()
        || jobs
            .iter()
            .any(|j| !j.desired_soft_skills.is_empty() || !j.company_culture.is_empty())
}

fn remote_expressed(candidate: &Candidate, jobs: &[JobPosting]) -> bool {
    candidate.remote_preference != RemotePreference::Unspecified
        || jobs.iter().any(|j| j.remote_policy.is_some())
}
