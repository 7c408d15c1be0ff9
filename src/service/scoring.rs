use crate::{
    models::{
        candidate::{Candidate, ContractType, RemotePreference},
        job::{ExperienceRange, JobPosting, RemotePolicy, SalaryBand},
        matching::{DimensionScore, TravelOutcome, TravelResult},
    },
    utils::{geo, text},
};

/// Skill equivalence table shared by every variant. Two tokens match
/// when they fold equal, belong to the same group, or exceed the
/// similarity threshold.
#[derive(Debug, Clone)]
pub struct SynonymTable {
    groups: Vec<Vec<String>>,
    threshold: f64,
}

impl SynonymTable {
    pub fn new(groups: Vec<Vec<String>>, threshold: f64) -> Self {
        let groups = groups
            .into_iter()
            .map(|group| group.iter().map(|s| text::fold(s)).collect())
            .collect();
        SynonymTable { groups, threshold }
    }

    pub fn matches(&self, a: &str, b: &str) -> bool {
        let a = text::fold(a);
        let b = text::fold(b);
        if a == b {
            return true;
        }
        if self
            .groups
            .iter()
            .any(|group| group.contains(&a) && group.contains(&b))
        {
            return true;
        }
        text::similarity(&a, &b) >= self.threshold
    }
}

impl Default for SynonymTable {
    fn default() -> Self {
        SynonymTable::new(
            vec![
                vec!["javascript".into(), "js".into()],
                vec!["typescript".into(), "ts".into()],
                vec!["postgresql".into(), "postgres".into()],
                vec!["golang".into(), "go".into()],
                vec!["kubernetes".into(), "k8s".into()],
                vec!["react".into(), "reactjs".into()],
                vec!["node".into(), "nodejs".into(), "node.js".into()],
                vec!["c#".into(), "csharp".into()],
            ],
            0.85,
        )
    }
}

/// Skills overlap. Empty requirement is neutral (0.5), an empty
/// candidate set scores low (0.2). Coverage of essential skills weighs
/// 1.5x, and surplus skills earn a capped bonus.
pub fn score_skills(
    candidate_skills: &[String],
    required_skills: &[String],
    essential_skills: &[String],
    synonyms: &SynonymTable,
) -> DimensionScore {
    if required_skills.is_empty() {
        return DimensionScore::new(0.5, "No skills specified in the job posting");
    }
    if candidate_skills.is_empty() {
        return DimensionScore::new(0.2, "Candidate has no listed skills");
    }

    let is_matched = |required: &String| {
        candidate_skills
            .iter()
            .any(|skill| synonyms.matches(skill, required))
    };

    let matched: Vec<&String> = required_skills.iter().filter(|r| is_matched(r)).collect();

    let essential: Vec<&String> = required_skills
        .iter()
        .filter(|r| essential_skills.iter().any(|e| synonyms.matches(e, r)))
        .collect();

    let mut base = if essential.is_empty() {
        matched.len() as f64 / required_skills.len() as f64
    } else {
        let essential_matched = essential.iter().filter(|r| is_matched(r)).count() as f64;
        let other_total = (required_skills.len() - essential.len()) as f64;
        let other_matched = matched
            .iter()
            .filter(|r| !essential.contains(r))
            .count() as f64;
        let weighted_total = 1.5 * essential.len() as f64 + other_total;
        (1.5 * essential_matched + other_matched) / weighted_total
    };

    if candidate_skills.len() > required_skills.len() {
        let surplus = (candidate_skills.len() - required_skills.len()) as f64;
        base += (surplus * 0.05).min(0.2);
    }

    let explanation = if matched.is_empty() {
        "No required skill matched".to_string()
    } else if matched.len() == required_skills.len() {
        format!(
            "All {} required skills matched ({})",
            required_skills.len(),
            join_names(&matched)
        )
    } else {
        format!(
            "{}/{} required skills matched ({})",
            matched.len(),
            required_skills.len(),
            join_names(&matched)
        )
    };

    DimensionScore::new(base.min(1.0), explanation)
}

fn join_names(names: &[&String]) -> String {
    names
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Experience fit against a `{min,max}` requirement. Overqualification
/// decays mildly toward 0.9; underqualification scales down from 0.8.
pub fn score_experience(
    candidate_years: f64,
    requirement: Option<&ExperienceRange>,
) -> DimensionScore {
    let Some(range) = requirement else {
        return DimensionScore::new(0.8, "No experience requirement stated");
    };

    if candidate_years >= range.min {
        if candidate_years <= range.max {
            return DimensionScore::new(
                1.0,
                format!(
                    "{:.0} years of experience fits the {:.0}-{:.0} year requirement",
                    candidate_years, range.min, range.max
                ),
            );
        }
        if range.max > 0.0 && candidate_years <= 1.5 * range.max {
            let value = 1.0 - (candidate_years - range.max) / (0.5 * range.max) * 0.1;
            return DimensionScore::new(
                value,
                format!(
                    "Slightly above the requested {:.0} years, still a strong fit",
                    range.max
                ),
            );
        }
        return DimensionScore::new(
            0.9,
            format!(
                "Overqualified: {:.0} years for a {:.0}-year position",
                candidate_years, range.max
            ),
        );
    }

    let value = ((candidate_years / range.min) * 0.8).max(0.0);
    DimensionScore::new(
        value,
        format!(
            "{:.0} years of experience, {:.0} requested",
            candidate_years, range.min
        ),
    )
}

/// Salary band fit. Unknown on either side is neutral (0.7).
pub fn score_salary(expectation: Option<u32>, band: Option<&SalaryBand>) -> DimensionScore {
    let (Some(expected), Some(band)) = (expectation, band) else {
        return DimensionScore::new(0.7, "Salary information incomplete");
    };
    let expected_f = expected as f64;
    let (min, max) = (band.min as f64, band.max as f64);

    if expected_f >= min && expected_f <= max {
        return DimensionScore::new(
            1.0,
            format!("Expectation {} falls inside the {}-{} band", expected, band.min, band.max),
        );
    }
    if expected_f < min {
        let value = (expected_f / min + 0.2).min(1.0);
        return DimensionScore::new(
            value,
            format!("Expectation {} is below the band minimum {}", expected, band.min),
        );
    }
    let value = (max / expected_f).max(0.1);
    DimensionScore::new(
        value,
        format!("Expectation {} exceeds the band maximum {}", expected, band.max),
    )
}

/// Converts a commute duration into the proximity subscore bands.
pub fn proximity_from_duration(duration_minutes: u32) -> f64 {
    match duration_minutes {
        0..=20 => 0.95,
        21..=30 => 0.85,
        31..=45 => 0.75,
        46..=60 => 0.60,
        61..=90 => 0.40,
        _ => 0.20,
    }
}

/// True when the commute score can be decided without a travel lookup.
pub fn remote_overrides_commute(candidate: &Candidate, job: &JobPosting) -> bool {
    job.remote_policy == Some(RemotePolicy::Remote)
        && matches!(
            candidate.remote_preference,
            RemotePreference::Remote | RemotePreference::Hybrid
        )
}

/// Location/commute score. `travel` carries the provider outcome when a
/// lookup was performed; `None` means no lookup was attempted.
pub fn score_proximity(
    candidate: &Candidate,
    job: &JobPosting,
    travel: Option<&TravelOutcome>,
) -> (DimensionScore, Option<TravelResult>) {
    if remote_overrides_commute(candidate, job) {
        return (
            DimensionScore::new(0.98, "Fully remote position, no commute needed"),
            None,
        );
    }

    let mut travel_info = None;
    let mut score = match travel {
        Some(TravelOutcome::Found(result)) => {
            let value = proximity_from_duration(result.duration_minutes);
            let mut explanation = format!(
                "Commute of {} min {} ({:.1} km)",
                result.duration_minutes,
                result.mode.label(),
                result.distance_km
            );
            if let Some(legs) = &result.transit_legs {
                let lines: Vec<String> = legs
                    .iter()
                    .take(3)
                    .map(|l| format!("{} ({})", l.line, l.vehicle))
                    .collect();
                if !lines.is_empty() {
                    explanation.push_str(&format!(", lines {}", lines.join(", ")));
                }
            }
            travel_info = Some(result.clone());
            DimensionScore::new(value, explanation)
        }
        _ => match (&candidate.location, &job.location) {
            (Some(origin), Some(destination)) => {
                if geo::same_city(origin, destination) {
                    DimensionScore::new(0.85, format!("Same locality: {}", destination))
                } else {
                    let distance = geo::estimate_distance_km(origin, destination);
                    let estimated_minutes = (distance / 50.0 * 60.0).round() as u32;
                    DimensionScore::new(
                        proximity_from_duration(estimated_minutes),
                        format!("Estimated distance of {:.0} km (no live travel data)", distance),
                    )
                }
            }
            _ => DimensionScore::new(0.40, "Location unknown on one side, neutral commute score"),
        },
    };

    if candidate.mobile {
        score.value = (score.value + 0.10).min(1.0);
        score.explanation.push_str("; candidate is mobile");
    }

    (score, travel_info)
}

/// Contract compatibility. Near-matches (CDI offered to a CDD seeker
/// and the internship/apprenticeship pair) score 0.8.
pub fn score_contract(
    accepted: &[ContractType],
    offered: Option<ContractType>,
) -> DimensionScore {
    let (Some(offered), false) = (offered, accepted.is_empty()) else {
        return DimensionScore::new(0.7, "Contract information incomplete");
    };

    if accepted.contains(&offered) {
        return DimensionScore::new(1.0, format!("{} matches the candidate's search", offered.to_str()));
    }

    let near_match = accepted.iter().any(|a| {
        matches!(
            (a, offered),
            (ContractType::Cdd, ContractType::Cdi)
                | (ContractType::Cdi, ContractType::Cdd)
                | (ContractType::Internship, ContractType::Apprenticeship)
                | (ContractType::Apprenticeship, ContractType::Internship)
        )
    });
    if near_match {
        return DimensionScore::new(
            0.8,
            format!("{} is close to the contracts the candidate accepts", offered.to_str()),
        );
    }

    DimensionScore::new(
        0.3,
        format!("{} is not among the candidate's accepted contracts", offered.to_str()),
    )
}

/// Flexibility: telework (40%), flexible hours (35%) and RTT days (25%).
pub fn score_flexibility(candidate: &Candidate, job: &JobPosting) -> DimensionScore {
    let mut notes = Vec::new();

    let telework = match candidate.remote_preference {
        RemotePreference::Remote => match job.remote_policy {
            Some(RemotePolicy::Remote) => 1.0,
            Some(RemotePolicy::HybridMajority) => 0.85,
            Some(RemotePolicy::HybridPartial) => 0.75,
            _ => 0.30,
        },
        RemotePreference::Hybrid => match job.remote_policy {
            Some(policy) if policy.is_hybrid() => 1.0,
            Some(RemotePolicy::Remote) => 0.85,
            _ => 0.30,
        },
        RemotePreference::Onsite => match job.remote_policy {
            Some(RemotePolicy::Onsite) | None => 1.0,
            _ => 0.85,
        },
        RemotePreference::Unspecified => 0.80,
    };
    notes.push(match telework {
        v if v >= 0.99 => "telework policy matches",
        v if v >= 0.7 => "telework policy is a workable compromise",
        _ => "telework expectation not met",
    });

    let hours = if candidate.wants_flexible_hours {
        if job.flexible_hours {
            notes.push("flexible hours available");
            0.95
        } else {
            notes.push("fixed hours only");
            0.45
        }
    } else {
        0.80
    };

    let rtt = if candidate.rtt_important {
        match job.rtt_days {
            d if d >= 15 => 0.95,
            10..=14 => 0.80,
            5..=9 => 0.65,
            _ => 0.40,
        }
    } else {
        0.75
    };
    if candidate.rtt_important {
        notes.push("RTT days weighed in");
    }

    let value = telework * 0.40 + hours * 0.35 + rtt * 0.25;
    DimensionScore::new(value, format!("Flexibility: {}", notes.join(", ")))
}

fn jaccard(a: &[String], b: &[String]) -> f64 {
    let a: Vec<String> = a.iter().map(|s| text::fold(s)).collect();
    let b: Vec<String> = b.iter().map(|s| text::fold(s)).collect();
    let intersection = a.iter().filter(|token| b.contains(token)).count() as f64;
    let union = (a.len() + b.len()) as f64 - intersection;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Soft-skill and culture alignment: overlap of the candidate's soft
/// skills and declared values against the company's expectations.
/// Floor 0.4 when signals exist on both sides, 0.6 when either is empty.
pub fn score_culture(candidate: &Candidate, job: &JobPosting) -> DimensionScore {
    let candidate_values: Vec<String> = candidate
        .values
        .iter()
        .chain(candidate.culture_preferences.iter())
        .cloned()
        .collect();

    let mut parts = Vec::new();
    if !candidate.soft_skills.is_empty() && !job.desired_soft_skills.is_empty() {
        parts.push(jaccard(&candidate.soft_skills, &job.desired_soft_skills));
    }
    if !candidate_values.is_empty() && !job.company_culture.is_empty() {
        parts.push(jaccard(&candidate_values, &job.company_culture));
    }

    if parts.is_empty() {
        return DimensionScore::new(0.6, "No culture signals on one side, neutral score");
    }

    let average = parts.iter().sum::<f64>() / parts.len() as f64;
    DimensionScore::new(
        average.max(0.4),
        format!("Culture alignment over {} signal set(s)", parts.len()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::candidate::TransportMode;
    use crate::models::matching::TravelSource;

    fn skills(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_required_skills_is_neutral() {
        let score = score_skills(&skills(&["Python"]), &[], &[], &SynonymTable::default());
        assert_eq!(score.value, 0.5);
    }

    #[test]
    fn empty_candidate_skills_scores_low() {
        let score = score_skills(&[], &skills(&["Python"]), &[], &SynonymTable::default());
        assert_eq!(score.value, 0.2);
    }

    #[test]
    fn skills_score_counts_overlap_and_surplus() {
        let table = SynonymTable::default();
        let candidate = skills(&["Python", "Django", "Sql", "Docker"]);
        let required = skills(&["Python", "Django"]);
        let score = score_skills(&candidate, &required, &[], &table);
        // 2/2 matched + 2 surplus skills -> 1.0 + 0.1 capped at 1.0
        assert_eq!(score.value, 1.0);
        assert!(score.explanation.contains("Python"));
        assert!(score.explanation.contains("Django"));
    }

    #[test]
    fn skills_score_is_order_independent() {
        let table = SynonymTable::default();
        let a = score_skills(
            &skills(&["Python", "Django", "Sql"]),
            &skills(&["Python", "Postgresql"]),
            &[],
            &table,
        );
        let b = score_skills(
            &skills(&["Sql", "Python", "Django"]),
            &skills(&["Postgresql", "Python"]),
            &[],
            &table,
        );
        assert_eq!(a.value, b.value);
    }

    #[test]
    fn synonym_table_bridges_near_matches() {
        let table = SynonymTable::default();
        assert!(table.matches("Postgres", "PostgreSQL"));
        assert!(table.matches("Js", "JavaScript"));
        assert!(table.matches("Kubernetes", "Kuberntes"));
        assert!(!table.matches("Python", "Java"));
    }

    #[test]
    fn essential_skills_weigh_more() {
        let table = SynonymTable::default();
        let required = skills(&["Python", "Django", "Kafka"]);
        let essential = skills(&["Kafka"]);
        // Covers the two non-essential skills but misses the essential one.
        let miss = score_skills(&skills(&["Python", "Django"]), &required, &essential, &table);
        // Covers the essential skill but only one other.
        let hit = score_skills(&skills(&["Kafka", "Python"]), &required, &essential, &table);
        assert!(hit.value > miss.value);
    }

    #[test]
    fn experience_at_minimum_is_perfect() {
        let range = ExperienceRange { min: 3.0, max: 5.0 };
        assert_eq!(score_experience(3.0, Some(&range)).value, 1.0);
        assert_eq!(score_experience(5.0, Some(&range)).value, 1.0);
    }

    #[test]
    fn experience_decay_and_floor() {
        let range = ExperienceRange { min: 2.0, max: 4.0 };
        // 1.25x over max: 1.0 - (5-4)/2 * 0.1 = 0.95
        let slightly_over = score_experience(5.0, Some(&range)).value;
        assert!((slightly_over - 0.95).abs() < 1e-9);
        // Far past 1.5x max
        assert_eq!(score_experience(10.0, Some(&range)).value, 0.9);
        // Under: (1/2)*0.8 = 0.4
        assert!((score_experience(1.0, Some(&range)).value - 0.4).abs() < 1e-9);
        assert_eq!(score_experience(7.0, None).value, 0.8);
    }

    #[test]
    fn salary_boundaries_are_exact() {
        let band = SalaryBand { min: 50000, max: 60000 };
        assert_eq!(score_salary(Some(50000), Some(&band)).value, 1.0);
        assert_eq!(score_salary(Some(60000), Some(&band)).value, 1.0);
        assert_eq!(score_salary(None, Some(&band)).value, 0.7);
        assert_eq!(score_salary(Some(50000), None).value, 0.7);
    }

    #[test]
    fn salary_outside_band_scales() {
        let band = SalaryBand { min: 50000, max: 60000 };
        let below = score_salary(Some(40000), Some(&band)).value;
        assert!((below - 1.0).abs() < 1e-9); // 0.8 + 0.2 capped
        let above = score_salary(Some(80000), Some(&band)).value;
        assert!((above - 0.75).abs() < 1e-9);
        let far_above = score_salary(Some(700000), Some(&band)).value;
        assert!((far_above - 0.1).abs() < 1e-9);
    }

    #[test]
    fn proximity_duration_bands() {
        assert_eq!(proximity_from_duration(20), 0.95);
        assert_eq!(proximity_from_duration(21), 0.85);
        assert_eq!(proximity_from_duration(45), 0.75);
        assert_eq!(proximity_from_duration(60), 0.60);
        assert_eq!(proximity_from_duration(90), 0.40);
        assert_eq!(proximity_from_duration(91), 0.20);
    }

    #[test]
    fn remote_job_overrides_location() {
        let candidate = Candidate {
            skills: skills(&["Python"]),
            remote_preference: RemotePreference::Remote,
            ..Default::default()
        };
        let job = JobPosting {
            title: "Dev".into(),
            remote_policy: Some(RemotePolicy::Remote),
            location: Some("Paris".into()),
            ..Default::default()
        };
        let (score, travel) = score_proximity(&candidate, &job, None);
        assert_eq!(score.value, 0.98);
        assert!(travel.is_none());
    }

    #[test]
    fn proximity_uses_travel_result_when_present() {
        let candidate = Candidate {
            skills: skills(&["Python"]),
            location: Some("Paris".into()),
            ..Default::default()
        };
        let job = JobPosting {
            title: "Dev".into(),
            location: Some("Versailles".into()),
            ..Default::default()
        };
        let outcome = TravelOutcome::Found(TravelResult {
            duration_minutes: 25,
            distance_km: 17.0,
            mode: TransportMode::Transit,
            source: TravelSource::Real,
            summary: "25 min by public transport".into(),
            transit_legs: None,
        });
        let (score, travel) = score_proximity(&candidate, &job, Some(&outcome));
        assert_eq!(score.value, 0.85);
        assert_eq!(travel.unwrap().duration_minutes, 25);
    }

    #[test]
    fn proximity_same_city_fallback() {
        let candidate = Candidate {
            skills: skills(&["Python"]),
            location: Some("Paris".into()),
            ..Default::default()
        };
        let job = JobPosting {
            title: "Dev".into(),
            location: Some("Paris 15e".into()),
            ..Default::default()
        };
        let (score, _) = score_proximity(&candidate, &job, Some(&TravelOutcome::Unavailable));
        assert_eq!(score.value, 0.85);
    }

    #[test]
    fn proximity_unknown_locations_is_neutral() {
        let candidate = Candidate {
            skills: skills(&["Python"]),
            ..Default::default()
        };
        let job = JobPosting {
            title: "Dev".into(),
            ..Default::default()
        };
        let (score, _) = score_proximity(&candidate, &job, None);
        assert_eq!(score.value, 0.40);
        assert!(score.explanation.contains("unknown"));
    }

    #[test]
    fn mobile_candidate_gets_bonus() {
        let candidate = Candidate {
            skills: skills(&["Python"]),
            mobile: true,
            ..Default::default()
        };
        let job = JobPosting {
            title: "Dev".into(),
            ..Default::default()
        };
        let (score, _) = score_proximity(&candidate, &job, None);
        assert!((score.value - 0.50).abs() < 1e-9);
    }

    #[test]
    fn contract_exact_near_and_mismatch() {
        let accepted = vec![ContractType::Cdd];
        assert_eq!(score_contract(&accepted, Some(ContractType::Cdd)).value, 1.0);
        assert_eq!(score_contract(&accepted, Some(ContractType::Cdi)).value, 0.8);
        assert_eq!(score_contract(&accepted, Some(ContractType::Freelance)).value, 0.3);
        assert_eq!(score_contract(&[], Some(ContractType::Cdi)).value, 0.7);
        assert_eq!(score_contract(&accepted, None).value, 0.7);
    }

    #[test]
    fn flexibility_weighs_subdimensions() {
        let candidate = Candidate {
            skills: skills(&["Python"]),
            remote_preference: RemotePreference::Hybrid,
            wants_flexible_hours: true,
            rtt_important: true,
            ..Default::default()
        };
        let job = JobPosting {
            title: "Dev".into(),
            remote_policy: Some(RemotePolicy::HybridPartial),
            flexible_hours: true,
            rtt_days: 18,
            ..Default::default()
        };
        let score = score_flexibility(&candidate, &job);
        let expected = 1.0 * 0.40 + 0.95 * 0.35 + 0.95 * 0.25;
        assert!((score.value - expected).abs() < 1e-9);
    }

    #[test]
    fn flexibility_penalizes_missing_telework() {
        let candidate = Candidate {
            skills: skills(&["Python"]),
            remote_preference: RemotePreference::Remote,
            ..Default::default()
        };
        let job = JobPosting {
            title: "Dev".into(),
            remote_policy: Some(RemotePolicy::Onsite),
            ..Default::default()
        };
        let score = score_flexibility(&candidate, &job);
        let expected = 0.30 * 0.40 + 0.80 * 0.35 + 0.75 * 0.25;
        assert!((score.value - expected).abs() < 1e-9);
    }

    #[test]
    fn culture_floors_and_neutral() {
        let candidate = Candidate {
            skills: skills(&["Python"]),
            values: skills(&["Innovation"]),
            ..Default::default()
        };
        let apart = JobPosting {
            title: "Dev".into(),
            company_culture: skills(&["Hierarchy", "Tradition"]),
            ..Default::default()
        };
        assert_eq!(score_culture(&candidate, &apart).value, 0.4);

        let empty = JobPosting {
            title: "Dev".into(),
            ..Default::default()
        };
        assert_eq!(score_culture(&candidate, &empty).value, 0.6);

        let aligned = JobPosting {
            title: "Dev".into(),
            company_culture: skills(&["Innovation"]),
            ..Default::default()
        };
        assert_eq!(score_culture(&candidate, &aligned).value, 1.0);
    }
}
