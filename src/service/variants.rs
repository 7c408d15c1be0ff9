use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    models::{
        candidate::{Candidate, TransportMode},
        job::JobPosting,
        matching::{Dimension, DimensionScore, MatchResult, TravelResult, WeightVector},
    },
    service::{
        error::ServiceError,
        scoring::{self, SynonymTable},
        travel_service::{TravelQuery, TravelTimeService},
    },
};

/// Everything a variant needs besides the canonical records.
pub struct MatchContext {
    pub travel: Arc<TravelTimeService>,
    pub synonyms: Arc<SynonymTable>,
}

/// Declared capabilities, used by the selector's diagnostics.
#[derive(Debug, Serialize, Clone, Copy)]
pub struct AlgorithmCapabilities {
    pub handles_geolocation: bool,
    pub handles_soft_skills: bool,
    pub handles_priorities: bool,
    pub handles_remote: bool,
    pub performance_score: f64,
}

/// The variant contract: claim support for a request, then score jobs
/// against the resolved weight vector. Implementations never mutate
/// their inputs and are deterministic for fixed inputs and cache state.
#[async_trait]
pub trait MatchAlgorithm: Send + Sync {
    fn name(&self) -> &'static str;
    fn capabilities(&self) -> AlgorithmCapabilities;
    fn base_weights(&self) -> WeightVector;
    fn supports(&self, candidate: &Candidate, jobs: &[JobPosting]) -> bool;
    async fn run(
        &self,
        ctx: &MatchContext,
        candidate: &Candidate,
        jobs: &[JobPosting],
        weights: &WeightVector,
    ) -> Result<Vec<MatchResult>, ServiceError>;
}

/// All selectable variants, in selector priority order (most capable
/// last).
pub fn registry() -> Vec<Arc<dyn MatchAlgorithm>> {
    vec![
        Arc::new(SkillsCentric),
        Arc::new(GeoAware),
        Arc::new(Enhanced),
        Arc::new(Comprehensive),
    ]
}

pub fn by_name(name: &str) -> Option<Arc<dyn MatchAlgorithm>> {
    registry().into_iter().find(|a| a.name() == name)
}

async fn proximity_with_travel(
    ctx: &MatchContext,
    candidate: &Candidate,
    job: &JobPosting,
) -> (DimensionScore, Option<TravelResult>) {
    if scoring::remote_overrides_commute(candidate, job) {
        return scoring::score_proximity(candidate, job, None);
    }
    let outcome = match (&candidate.location, &job.location) {
        (Some(origin), Some(destination)) => {
            let departure = if candidate.transport_preference == TransportMode::Transit {
                candidate.departure_time.clone()
            } else {
                None
            };
            let query = TravelQuery::new(
                origin.clone(),
                destination.clone(),
                candidate.transport_preference,
                departure,
            );
            Some(ctx.travel.travel_time(&query).await)
        }
        _ => None,
    };
    scoring::score_proximity(candidate, job, outcome.as_ref())
}

fn compose(
    algorithm: &'static str,
    job: &JobPosting,
    weights: &WeightVector,
    scores: Vec<(Dimension, DimensionScore)>,
    travel_info: Option<TravelResult>,
    bonus: f64,
) -> MatchResult {
    let mut per_dimension = HashMap::new();
    let mut weighted_total = 0.0;
    for (dimension, score) in scores {
        let weight = weights.get(dimension);
        weighted_total += score.value * weight;
        per_dimension.insert(dimension, score.weighted(weight));
    }

    let global_score = ((weighted_total * 100.0) + bonus).clamp(0.0, 100.0).round() as u32;

    MatchResult {
        job_id: job.id.clone(),
        title: job.title.clone(),
        global_score,
        per_dimension,
        confidence: global_score as f64 / 100.0,
        travel_info,
        algorithm_used: algorithm.to_string(),
        fallback_used: false,
        algorithm_scores: None,
    }
}

fn sort_by_score(results: &mut [MatchResult]) {
    results.sort_by(|a, b| {
        b.global_score
            .cmp(&a.global_score)
            .then(b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal))
    });
}

/// Minimal-data variant: skills, contract and experience only.
pub struct SkillsCentric;

#[async_trait]
impl MatchAlgorithm for SkillsCentric {
    fn name(&self) -> &'static str {
        "skills-centric"
    }

    fn capabilities(&self) -> AlgorithmCapabilities {
        AlgorithmCapabilities {
            handles_geolocation: false,
            handles_soft_skills: false,
            handles_priorities: false,
            handles_remote: false,
            performance_score: 0.85,
        }
    }

    fn base_weights(&self) -> WeightVector {
        WeightVector::from_pairs(&[
            (Dimension::Skills, 0.55),
            (Dimension::Experience, 0.25),
            (Dimension::Contract, 0.20),
        ])
    }

    fn supports(&self, _candidate: &Candidate, _jobs: &[JobPosting]) -> bool {
        true
    }

    async fn run(
        &self,
        ctx: &MatchContext,
        candidate: &Candidate,
        jobs: &[JobPosting],
        weights: &WeightVector,
    ) -> Result<Vec<MatchResult>, ServiceError> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            let scores = vec![
                (
                    Dimension::Skills,
                    scoring::score_skills(
                        &candidate.skills,
                        &job.required_skills,
                        &job.essential_skills,
                        &ctx.synonyms,
                    ),
                ),
                (
                    Dimension::Experience,
                    scoring::score_experience(
                        candidate.years_experience,
                        job.required_experience.as_ref(),
                    ),
                ),
                (
                    Dimension::Contract,
                    scoring::score_contract(&candidate.contract_types, job.contract_type),
                ),
            ];
            results.push(compose(self.name(), job, weights, scores, None, 0.0));
        }
        sort_by_score(&mut results);
        Ok(results)
    }
}

/// Location-aware variant: skills plus commute, contract and the
/// telework side of flexibility.
pub struct GeoAware;

#[async_trait]
impl MatchAlgorithm for GeoAware {
    fn name(&self) -> &'static str {
        "geo-aware"
    }

    fn capabilities(&self) -> AlgorithmCapabilities {
        AlgorithmCapabilities {
            handles_geolocation: true,
            handles_soft_skills: false,
            handles_priorities: false,
            handles_remote: true,
            performance_score: 0.90,
        }
    }

    fn base_weights(&self) -> WeightVector {
        WeightVector::from_pairs(&[
            (Dimension::Skills, 0.35),
            (Dimension::Proximity, 0.35),
            (Dimension::Contract, 0.15),
            (Dimension::Flexibility, 0.15),
        ])
    }

    fn supports(&self, candidate: &Candidate, jobs: &[JobPosting]) -> bool {
        candidate.location.is_some() && jobs.iter().any(|j| j.location.is_some())
    }

    async fn run(
        &self,
        ctx: &MatchContext,
        candidate: &Candidate,
        jobs: &[JobPosting],
        weights: &WeightVector,
    ) -> Result<Vec<MatchResult>, ServiceError> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            let (proximity, travel_info) = proximity_with_travel(ctx, candidate, job).await;
            let scores = vec![
                (
                    Dimension::Skills,
                    scoring::score_skills(
                        &candidate.skills,
                        &job.required_skills,
                        &job.essential_skills,
                        &ctx.synonyms,
                    ),
                ),
                (Dimension::Proximity, proximity),
                (
                    Dimension::Contract,
                    scoring::score_contract(&candidate.contract_types, job.contract_type),
                ),
                (Dimension::Flexibility, scoring::score_flexibility(candidate, job)),
            ];
            results.push(compose(self.name(), job, weights, scores, travel_info, 0.0));
        }
        sort_by_score(&mut results);
        Ok(results)
    }
}

/// Soft-skill-aware variant: adds salary, culture and flexibility on
/// top of the skill core.
pub struct Enhanced;

#[async_trait]
impl MatchAlgorithm for Enhanced {
    fn name(&self) -> &'static str {
        "enhanced"
    }

    fn capabilities(&self) -> AlgorithmCapabilities {
        AlgorithmCapabilities {
            handles_geolocation: false,
            handles_soft_skills: true,
            handles_priorities: false,
            handles_remote: true,
            performance_score: 0.95,
        }
    }

    fn base_weights(&self) -> WeightVector {
        WeightVector::from_pairs(&[
            (Dimension::Skills, 0.30),
            (Dimension::Experience, 0.15),
            (Dimension::Salary, 0.20),
            (Dimension::Culture, 0.20),
            (Dimension::Flexibility, 0.15),
        ])
    }

    fn supports(&self, candidate: &Candidate, jobs: &[JobPosting]) -> bool {
        !candidate.soft_skills.is_empty()
            || !candidate.values.is_empty()
            || !candidate.culture_preferences.is_empty()
            || jobs
                .iter()
                .any(|j| !j.desired_soft_skills.is_empty() || !j.company_culture.is_empty())
    }

    async fn run(
        &self,
        ctx: &MatchContext,
        candidate: &Candidate,
        jobs: &[JobPosting],
        weights: &WeightVector,
    ) -> Result<Vec<MatchResult>, ServiceError> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            let scores = vec![
                (
                    Dimension::Skills,
                    scoring::score_skills(
                        &candidate.skills,
                        &job.required_skills,
                        &job.essential_skills,
                        &ctx.synonyms,
                    ),
                ),
                (
                    Dimension::Experience,
                    scoring::score_experience(
                        candidate.years_experience,
                        job.required_experience.as_ref(),
                    ),
                ),
                (
                    Dimension::Salary,
                    scoring::score_salary(candidate.salary_expectation, job.salary_band.as_ref()),
                ),
                (Dimension::Culture, scoring::score_culture(candidate, job)),
                (Dimension::Flexibility, scoring::score_flexibility(candidate, job)),
            ];
            results.push(compose(self.name(), job, weights, scores, None, 0.0));
        }
        sort_by_score(&mut results);
        Ok(results)
    }
}

/// Full-spectrum variant: every dimension, commute via the travel
/// provider and capped intelligence bonuses on top of the weighted
/// base.
pub struct Comprehensive;

const INTELLIGENCE_BONUS_CAP: f64 = 15.0;

fn intelligence_bonus(
    candidate: &Candidate,
    job: &JobPosting,
    synonyms: &SynonymTable,
) -> (f64, Vec<String>) {
    let mut total: f64 = 0.0;
    let mut reasons = Vec::new();

    let all_required_matched = !job.required_skills.is_empty()
        && job
            .required_skills
            .iter()
            .all(|r| candidate.skills.iter().any(|s| synonyms.matches(s, r)));
    if all_required_matched && candidate.skills.len() >= job.required_skills.len() + 2 {
        total += 10.0;
        reasons.push("Specialization match: every required skill covered with headroom".to_string());
    }

    const LEADERSHIP_MARKERS: &[&str] = &["leadership", "management", "mentoring", "lead"];
    let candidate_leads = candidate
        .soft_skills
        .iter()
        .any(|s| LEADERSHIP_MARKERS.iter().any(|m| s.to_lowercase().contains(m)));
    let job_wants_lead = job
        .desired_soft_skills
        .iter()
        .any(|s| LEADERSHIP_MARKERS.iter().any(|m| s.to_lowercase().contains(m)));
    if candidate_leads && job_wants_lead {
        total += 15.0;
        reasons.push("Leadership markers on both sides".to_string());
    }

    let evolution_focus = candidate
        .priorities
        .and_then(|p| p.evolution)
        .map(|n| n >= 8.0)
        .unwrap_or(false);
    let within_band = job
        .required_experience
        .map(|r| candidate.years_experience >= r.min)
        .unwrap_or(false);
    if evolution_focus && within_band {
        total += 10.0;
        reasons.push("Growth-focused profile aligned with the role's seniority".to_string());
    }

    (total.min(INTELLIGENCE_BONUS_CAP), reasons)
}

#[async_trait]
impl MatchAlgorithm for Comprehensive {
    fn name(&self) -> &'static str {
        "comprehensive"
    }

    fn capabilities(&self) -> AlgorithmCapabilities {
        AlgorithmCapabilities {
            handles_geolocation: true,
            handles_soft_skills: true,
            handles_priorities: true,
            handles_remote: true,
            performance_score: 0.98,
        }
    }

    fn base_weights(&self) -> WeightVector {
        WeightVector::from_pairs(&[
            (Dimension::Skills, 0.25),
            (Dimension::Experience, 0.15),
            (Dimension::Salary, 0.20),
            (Dimension::Proximity, 0.20),
            (Dimension::Flexibility, 0.05),
            (Dimension::Culture, 0.10),
            (Dimension::Contract, 0.05),
        ])
    }

    fn supports(&self, candidate: &Candidate, _jobs: &[JobPosting]) -> bool {
        candidate.has_priorities()
    }

    async fn run(
        &self,
        ctx: &MatchContext,
        candidate: &Candidate,
        jobs: &[JobPosting],
        weights: &WeightVector,
    ) -> Result<Vec<MatchResult>, ServiceError> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            let (proximity, travel_info) = proximity_with_travel(ctx, candidate, job).await;
            let (bonus, reasons) = intelligence_bonus(candidate, job, &ctx.synonyms);

            let mut skills = scoring::score_skills(
                &candidate.skills,
                &job.required_skills,
                &job.essential_skills,
                &ctx.synonyms,
            );
            if !reasons.is_empty() {
                skills.explanation.push_str("; ");
                skills.explanation.push_str(&reasons.join("; "));
            }

            let scores = vec![
                (Dimension::Skills, skills),
                (
                    Dimension::Experience,
                    scoring::score_experience(
                        candidate.years_experience,
                        job.required_experience.as_ref(),
                    ),
                ),
                (
                    Dimension::Salary,
                    scoring::score_salary(candidate.salary_expectation, job.salary_band.as_ref()),
                ),
                (Dimension::Proximity, proximity),
                (Dimension::Flexibility, scoring::score_flexibility(candidate, job)),
                (Dimension::Culture, scoring::score_culture(candidate, job)),
                (
                    Dimension::Contract,
                    scoring::score_contract(&candidate.contract_types, job.contract_type),
                ),
            ];
            results.push(compose(self.name(), job, weights, scores, travel_info, bonus));
        }
        sort_by_score(&mut results);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::candidate::{CandidatePriorities, ContractType, RemotePreference};
    use crate::models::job::{RemotePolicy, SalaryBand};
    use crate::service::travel_service::{ProviderMode, TravelTimeSettings};
    use crate::service::weights;

    fn ctx() -> MatchContext {
        MatchContext {
            travel: Arc::new(TravelTimeService::new(
                TravelTimeSettings {
                    mode: ProviderMode::Simulated,
                    ..Default::default()
                },
                None,
            )),
            synonyms: Arc::new(SynonymTable::default()),
        }
    }

    fn strong_candidate() -> Candidate {
        Candidate {
            id: "c1".into(),
            skills: vec!["Python".into(), "Django".into(), "Sql".into()],
            years_experience: 5.0,
            location: Some("Paris".into()),
            salary_expectation: Some(55000),
            contract_types: vec![ContractType::Cdi],
            max_commute_minutes: 60,
            ..Default::default()
        }
    }

    fn python_job() -> JobPosting {
        JobPosting {
            id: "j1".into(),
            title: "Senior Python".into(),
            required_skills: vec!["Python".into(), "Django".into(), "Postgresql".into()],
            location: Some("Paris".into()),
            salary_band: Some(SalaryBand { min: 50000, max: 60000 }),
            contract_type: Some(ContractType::Cdi),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn skills_centric_scores_and_sorts() {
        let variant = SkillsCentric;
        let weights = weights::resolve_weights(&variant.base_weights(), None);
        let candidate = strong_candidate();
        let weak_job = JobPosting {
            id: "j2".into(),
            title: "Go Developer".into(),
            required_skills: vec!["Go".into(), "Kubernetes".into()],
            ..Default::default()
        };
        let results = variant
            .run(&ctx(), &candidate, &[weak_job, python_job()], &weights)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].job_id, "j1");
        assert!(results[0].global_score > results[1].global_score);
    }

    #[tokio::test]
    async fn remote_match_scores_high_proximity() {
        let variant = GeoAware;
        let weights = weights::resolve_weights(&variant.base_weights(), None);
        let candidate = Candidate {
            skills: vec!["Python".into(), "Sql".into()],
            location: Some("Lyon".into()),
            remote_preference: RemotePreference::Remote,
            ..Default::default()
        };
        let job = JobPosting {
            id: "j1".into(),
            title: "Remote Python".into(),
            required_skills: vec!["Python".into(), "Sql".into()],
            location: Some("Paris".into()),
            remote_policy: Some(RemotePolicy::Remote),
            ..Default::default()
        };
        let results = variant.run(&ctx(), &candidate, &[job], &weights).await.unwrap();
        let proximity = &results[0].per_dimension[&Dimension::Proximity];
        assert!(proximity.value >= 0.95);
        assert!(results[0].global_score >= 80, "score was {}", results[0].global_score);
    }

    #[tokio::test]
    async fn comprehensive_applies_capped_bonus() {
        let variant = Comprehensive;
        let candidate = Candidate {
            skills: vec![
                "Python".into(),
                "Django".into(),
                "Sql".into(),
                "Docker".into(),
                "Aws".into(),
            ],
            soft_skills: vec!["Leadership".into()],
            years_experience: 6.0,
            priorities: Some(CandidatePriorities {
                evolution: Some(9.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let job = JobPosting {
            id: "j1".into(),
            title: "Lead Python".into(),
            required_skills: vec!["Python".into(), "Django".into()],
            desired_soft_skills: vec!["Leadership".into()],
            required_experience: Some(crate::models::job::ExperienceRange { min: 3.0, max: 6.0 }),
            ..Default::default()
        };
        let (bonus, reasons) = intelligence_bonus(&candidate, &job, &SynonymTable::default());
        assert_eq!(bonus, INTELLIGENCE_BONUS_CAP);
        assert_eq!(reasons.len(), 3);

        let weights = weights::resolve_weights(&variant.base_weights(), candidate.priorities.as_ref());
        let results = variant.run(&ctx(), &candidate, &[job], &weights).await.unwrap();
        assert!(results[0].global_score <= 100);
    }

    #[tokio::test]
    async fn variants_are_deterministic() {
        let variant = Comprehensive;
        let weights = weights::resolve_weights(&variant.base_weights(), None);
        let candidate = strong_candidate();
        let jobs = [python_job()];
        let context = ctx();
        let first = variant.run(&context, &candidate, &jobs, &weights).await.unwrap();
        let second = variant.run(&context, &candidate, &jobs, &weights).await.unwrap();
        assert_eq!(first[0].global_score, second[0].global_score);
        assert_eq!(first[0].per_dimension.len(), second[0].per_dimension.len());
    }

    #[test]
    fn registry_exposes_all_variants() {
        let names: Vec<&str> = registry().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["skills-centric", "geo-aware", "enhanced", "comprehensive"]);
        assert!(by_name("enhanced").is_some());
        assert!(by_name("nope").is_none());
    }
}
