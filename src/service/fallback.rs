use std::collections::HashMap;

use crate::{
    models::{
        candidate::Candidate,
        job::JobPosting,
        matching::{Dimension, DimensionScore, MatchResult},
    },
    service::error::ErrorClass,
    service::resilience::fallback_entry_point,
    utils::{geo, text},
};

/// Degraded variants, ordered from most to least faithful. They work on
/// canonical fields only and never fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    Simple,
    Keyword,
    Statistical,
    Emergency,
}

impl FallbackKind {
    pub fn name(&self) -> &'static str {
        match self {
            FallbackKind::Simple => "simple",
            FallbackKind::Keyword => "keyword",
            FallbackKind::Statistical => "statistical",
            FallbackKind::Emergency => "emergency",
        }
    }

    /// Confidence multiplier applied to the score-derived confidence.
    /// Emergency ignores the multiplier and pins confidence to 0.3.
    pub fn confidence_factor(&self) -> f64 {
        match self {
            FallbackKind::Simple => 0.8,
            FallbackKind::Keyword => 0.75,
            FallbackKind::Statistical => 0.7,
            FallbackKind::Emergency => 0.3,
        }
    }

    fn from_name(name: &str) -> FallbackKind {
        match name {
            "keyword" => FallbackKind::Keyword,
            "statistical" => FallbackKind::Statistical,
            "emergency" => FallbackKind::Emergency,
            _ => FallbackKind::Simple,
        }
    }
}

/// The ordered degradation sequence for a failure class, always ending
/// in the emergency baseline.
pub fn chain_for(class: ErrorClass) -> Vec<FallbackKind> {
    let order = [
        FallbackKind::Simple,
        FallbackKind::Keyword,
        FallbackKind::Statistical,
    ];
    let entry = FallbackKind::from_name(fallback_entry_point(class));
    let start = order.iter().position(|k| *k == entry).unwrap_or(0);
    let mut chain: Vec<FallbackKind> = order[start..].to_vec();
    chain.push(FallbackKind::Emergency);
    chain
}

/// Runs one degraded variant. Results carry `fallback_used = true` and
/// the reduced confidence of their kind.
pub fn run(
    kind: FallbackKind,
    candidate: &Candidate,
    jobs: &[JobPosting],
    limit: usize,
) -> Vec<MatchResult> {
    let mut results: Vec<MatchResult> = jobs
        .iter()
        .take(limit.max(1))
        .map(|job| match kind {
            FallbackKind::Simple => simple_match(candidate, job),
            FallbackKind::Keyword => keyword_match(candidate, job),
            FallbackKind::Statistical => statistical_match(candidate, job),
            FallbackKind::Emergency => emergency_match(job),
        })
        .collect();

    results.sort_by(|a, b| b.global_score.cmp(&a.global_score));
    results
}

fn result_for(kind: FallbackKind, job: &JobPosting, score: f64, dimensions: Vec<(Dimension, DimensionScore)>) -> MatchResult {
    let global_score = (score * 100.0).clamp(0.0, 100.0).round() as u32;
    let confidence = if kind == FallbackKind::Emergency {
        0.3
    } else {
        (score * kind.confidence_factor()).clamp(0.0, 1.0)
    };
    MatchResult {
        job_id: job.id.clone(),
        title: job.title.clone(),
        global_score,
        per_dimension: dimensions.into_iter().collect::<HashMap<_, _>>(),
        confidence,
        travel_info: None,
        algorithm_used: format!("fallback-{}", kind.name()),
        fallback_used: true,
        algorithm_scores: None,
    }
}

/// Simplified skill/contract/location/experience blend, weighted
/// 0.4/0.2/0.2/0.2.
fn simple_match(candidate: &Candidate, job: &JobPosting) -> MatchResult {
    let skills = simple_skills_score(candidate, job);
    let contract = match job.contract_type {
        None => 0.7,
        Some(_) if candidate.contract_types.is_empty() => 0.7,
        Some(offered) if candidate.contract_types.contains(&offered) => 1.0,
        Some(_) => 0.3,
    };
    let location = simple_location_score(candidate, job);
    let experience = match job.required_experience {
        None => 0.8,
        Some(range) if range.min <= 0.0 => 0.8,
        Some(_) if candidate.years_experience == 0.0 => 0.3,
        Some(range) if candidate.years_experience >= range.min => 1.0,
        Some(range) => (candidate.years_experience / range.min).min(1.0),
    };

    let score = skills * 0.4 + contract * 0.2 + location * 0.2 + experience * 0.2;
    result_for(
        FallbackKind::Simple,
        job,
        score,
        vec![
            (
                Dimension::Skills,
                DimensionScore::new(skills, "Direct skill overlap (degraded scoring)").weighted(0.4),
            ),
            (
                Dimension::Contract,
                DimensionScore::new(contract, "Contract comparison (degraded scoring)").weighted(0.2),
            ),
            (
                Dimension::Proximity,
                DimensionScore::new(location, "Locality string comparison (degraded scoring)")
                    .weighted(0.2),
            ),
            (
                Dimension::Experience,
                DimensionScore::new(experience, "Years-of-experience ratio (degraded scoring)")
                    .weighted(0.2),
            ),
        ],
    )
}

fn simple_skills_score(candidate: &Candidate, job: &JobPosting) -> f64 {
    if job.required_skills.is_empty() {
        return 0.6;
    }
    if candidate.skills.is_empty() {
        return 0.2;
    }
    let folded: Vec<String> = candidate.skills.iter().map(|s| text::fold(s)).collect();
    let matched = job
        .required_skills
        .iter()
        .filter(|r| folded.contains(&text::fold(r)))
        .count();
    let mut ratio = matched as f64 / job.required_skills.len() as f64;
    if candidate.skills.len() > job.required_skills.len() {
        let surplus = (candidate.skills.len() - job.required_skills.len()) as f64;
        ratio += (surplus * 0.05).min(0.2);
    }
    ratio.min(1.0)
}

fn simple_location_score(candidate: &Candidate, job: &JobPosting) -> f64 {
    let (Some(origin), Some(destination)) = (&candidate.location, &job.location) else {
        return 0.6;
    };
    let a = text::fold(origin);
    let b = text::fold(destination);
    if a == b {
        return 1.0;
    }
    if geo::same_city(origin, destination) {
        return 0.8;
    }
    let words_a: Vec<&str> = a.split_whitespace().collect();
    if words_a.iter().any(|w| b.split_whitespace().any(|v| v == *w)) {
        return 0.7;
    }
    0.4
}

fn tokenize(parts: &[&str]) -> Vec<String> {
    let mut tokens = Vec::new();
    for part in parts {
        for word in part.split(|c: char| !c.is_alphanumeric()) {
            let folded = text::fold(word);
            if folded.chars().count() > 2 && !tokens.contains(&folded) {
                tokens.push(folded);
            }
        }
    }
    tokens
}

fn candidate_keywords(candidate: &Candidate) -> Vec<String> {
    let mut parts: Vec<&str> = Vec::new();
    parts.extend(candidate.skills.iter().map(String::as_str));
    parts.extend(candidate.soft_skills.iter().map(String::as_str));
    parts.extend(candidate.values.iter().map(String::as_str));
    parts.extend(candidate.culture_preferences.iter().map(String::as_str));
    tokenize(&parts)
}

fn job_keywords(job: &JobPosting) -> Vec<String> {
    let mut parts: Vec<&str> = vec![job.title.as_str(), job.company.as_str()];
    parts.extend(job.required_skills.iter().map(String::as_str));
    parts.extend(job.desired_soft_skills.iter().map(String::as_str));
    tokenize(&parts)
}

/// Keyword overlap between the candidate's tokens and the posting text.
fn keyword_match(candidate: &Candidate, job: &JobPosting) -> MatchResult {
    let candidate_tokens = candidate_keywords(candidate);
    let job_tokens = job_keywords(job);

    let score = if job_tokens.is_empty() {
        0.5
    } else {
        let matched = job_tokens
            .iter()
            .filter(|token| candidate_tokens.contains(token))
            .count();
        (matched as f64 / job_tokens.len() as f64).min(1.0)
    };

    result_for(
        FallbackKind::Keyword,
        job,
        score,
        vec![(
            Dimension::Skills,
            DimensionScore::new(score, "Keyword overlap with the posting text").weighted(1.0),
        )],
    )
}

/// Frequency-profile overlap of candidate tokens against the posting.
fn statistical_match(candidate: &Candidate, job: &JobPosting) -> MatchResult {
    let mut frequency: HashMap<String, usize> = HashMap::new();
    for token in candidate_keywords(candidate) {
        *frequency.entry(token).or_insert(0) += 1;
    }

    let job_tokens = job_keywords(job);
    let score = if job_tokens.is_empty() || frequency.is_empty() {
        0.5
    } else {
        let total: usize = frequency.values().sum();
        let mut accumulated = 0.0;
        for token in &job_tokens {
            if let Some(count) = frequency.get(token) {
                accumulated += *count as f64 / total as f64;
            }
        }
        accumulated.min(1.0)
    };

    result_for(
        FallbackKind::Statistical,
        job,
        score,
        vec![(
            Dimension::Skills,
            DimensionScore::new(score, "Term-frequency overlap with the posting").weighted(1.0),
        )],
    )
}

const ENGINEERING_KEYWORDS: &[&str] = &["développeur", "developpeur", "developer", "ingénieur", "ingenieur", "engineer"];

/// Deterministic 50-point baseline with a title bonus. Never fails and
/// yields one result per input job.
fn emergency_match(job: &JobPosting) -> MatchResult {
    let title = text::fold(&job.title);
    let mut score = 50u32;
    if ENGINEERING_KEYWORDS.iter().any(|k| title.contains(k)) {
        score += 10;
    }
    result_for(
        FallbackKind::Emergency,
        job,
        score as f64 / 100.0,
        vec![(
            Dimension::Skills,
            DimensionScore::new(score as f64 / 100.0, "Emergency baseline score, limited data")
                .weighted(1.0),
        )],
    )
}
