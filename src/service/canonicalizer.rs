use regex::Regex;
use serde_json::Value;

use crate::{
    models::{
        candidate::{
            Candidate, CandidatePriorities, ContractType, RemotePreference, TransportMode,
        },
        job::{ExperienceRange, JobPosting, RemotePolicy, SalaryBand},
    },
    service::error::ServiceError,
    utils::text,
};

/// Maps a free-form candidate record onto the canonical schema.
///
/// The only hard requirement is a non-empty skill set; everything else
/// degrades to defaults. Field aliases cover the French questionnaire
/// names used upstream.
pub fn canonicalize_candidate(raw: &Value) -> Result<Candidate, ServiceError> {
    let skills = normalize_skills(field(raw, &["skills", "competences"]));
    if skills.is_empty() {
        return Err(ServiceError::InvalidInput(
            "candidate is missing required field: skills".to_string(),
        ));
    }

    let priorities = normalize_priorities(field(raw, &["priorities", "priorites_candidat", "priorites"]));

    Ok(Candidate {
        id: string_field(raw, &["id"]).unwrap_or_else(|| "candidate".to_string()),
        name: string_field(raw, &["name", "nom"]).unwrap_or_default(),
        skills,
        soft_skills: normalize_skills(field(raw, &["soft_skills", "competences_comportementales"])),
        years_experience: normalize_experience_years(field(
            raw,
            &["years_experience", "annees_experience", "experience"],
        )),
        location: normalize_location(field(raw, &["location", "adresse", "localisation"])),
        mobile: is_mobile(field(raw, &["mobile", "mobilite"])),
        salary_expectation: normalize_salary(field(
            raw,
            &["salary_expectation", "salaire_souhaite", "remuneration_souhaitee"],
        )),
        contract_types: normalize_contract_set(field(
            raw,
            &["contract_types", "contrats_recherches"],
        )),
        remote_preference: normalize_remote_preference(field(
            raw,
            &["remote_preference", "preferences_remote", "teletravail"],
        )),
        transport_preference: field(raw, &["transport_preference", "transport_prefere"])
            .and_then(Value::as_str)
            .and_then(TransportMode::from_label)
            .unwrap_or_default(),
        departure_time: string_field(raw, &["departure_time", "heure_depart_travail"])
            .filter(|t| is_valid_departure(t)),
        max_commute_minutes: field(raw, &["max_commute_minutes", "temps_trajet_max"])
            .and_then(Value::as_u64)
            .filter(|m| *m > 0)
            .map(|m| m as u32)
            .unwrap_or(60),
        priorities,
        values: normalize_skills(field(raw, &["values", "valeurs_importantes", "valeurs"])),
        culture_preferences: normalize_skills(field(
            raw,
            &["culture_preferences", "preferences_culture"],
        )),
        wants_flexible_hours: truthy(field(
            raw,
            &["wants_flexible_hours", "horaires_flexibles"],
        )),
        rtt_important: truthy(field(raw, &["rtt_important"])),
    })
}

/// Maps a free-form job posting onto the canonical schema. Requires a
/// title and a non-empty required-skill set.
pub fn canonicalize_job(raw: &Value, index: usize) -> Result<JobPosting, ServiceError> {
    let title = string_field(raw, &["title", "titre"])
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            ServiceError::InvalidInput(format!("job #{} is missing required field: title", index))
        })?;

    let required_skills = normalize_skills(field(raw, &["required_skills", "competences"]));
    if required_skills.is_empty() {
        return Err(ServiceError::InvalidInput(format!(
            "job '{}' is missing required field: required_skills",
            title
        )));
    }

    Ok(JobPosting {
        id: string_field(raw, &["id"]).unwrap_or_else(|| format!("job_{}", index)),
        title,
        company: string_field(raw, &["company", "entreprise"]).unwrap_or_default(),
        required_skills,
        essential_skills: normalize_skills(field(
            raw,
            &["essential_skills", "competences_essentielles"],
        )),
        desired_soft_skills: normalize_skills(field(raw, &["desired_soft_skills", "soft_skills"])),
        required_experience: normalize_experience_range(field(
            raw,
            &["required_experience", "experience_requise", "required_experience_years"],
        )),
        contract_type: field(raw, &["contract_type", "type_contrat"])
            .and_then(Value::as_str)
            .and_then(ContractType::from_label),
        location: normalize_location(field(raw, &["location", "localisation", "lieu"])),
        remote_policy: field(raw, &["remote_policy", "politique_remote"])
            .and_then(Value::as_str)
            .and_then(normalize_remote_policy),
        salary_band: normalize_salary_band(field(
            raw,
            &["salary_band", "salaire", "fourchette_salariale"],
        )),
        benefits: normalize_skills(field(raw, &["benefits", "avantages"])),
        company_culture: normalize_skills(field(raw, &["company_culture", "culture_entreprise"])),
        flexible_hours: truthy(field(raw, &["flexible_hours", "horaires_flexibles"])),
        rtt_days: field(raw, &["rtt_days", "jours_rtt"])
            .and_then(Value::as_u64)
            .map(|d| d as u32)
            .unwrap_or(0),
    })
}

pub fn canonicalize_jobs(raw_jobs: &[Value]) -> Result<Vec<JobPosting>, ServiceError> {
    raw_jobs
        .iter()
        .enumerate()
        .map(|(i, raw)| canonicalize_job(raw, i))
        .collect()
}

fn field<'a>(raw: &'a Value, names: &[&str]) -> Option<&'a Value> {
    let object = raw.as_object()?;
    names
        .iter()
        .find_map(|name| object.get(*name))
        .filter(|v| !v.is_null())
}

fn string_field(raw: &Value, names: &[&str]) -> Option<String> {
    field(raw, names)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Skill normalization: split string input on `,` and `;`, trim,
/// title-case for display, drop tokens shorter than 2 chars, dedup
/// case-insensitively preserving first occurrence.
fn normalize_skills(value: Option<&Value>) -> Vec<String> {
    let tokens: Vec<String> = match value {
        Some(Value::String(s)) => s.split([',', ';']).map(str::to_string).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    let mut seen: Vec<String> = Vec::new();
    let mut normalized = Vec::new();
    for token in tokens {
        let trimmed = token.trim();
        if trimmed.chars().count() < 2 {
            continue;
        }
        let folded = text::fold(trimmed);
        if seen.contains(&folded) {
            continue;
        }
        seen.push(folded);
        normalized.push(text::capitalize_words(trimmed));
    }
    normalized
}

fn first_integer(s: &str) -> Option<u64> {
    let re = Regex::new(r"\d+").expect("static regex");
    re.find(&s.replace(' ', ""))
        .and_then(|m| m.as_str().parse().ok())
}

fn normalize_experience_years(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::String(s)) => first_integer(s).map(|n| n as f64).unwrap_or(0.0),
        Some(v) => v.as_f64().map(|n| n.max(0.0)).unwrap_or(0.0),
        None => 0.0,
    }
}

fn normalize_experience_range(value: Option<&Value>) -> Option<ExperienceRange> {
    match value? {
        Value::Object(map) => {
            let min = map.get("min").and_then(Value::as_f64)?.max(0.0);
            let max = map.get("max").and_then(Value::as_f64).unwrap_or(min).max(min);
            Some(ExperienceRange { min, max })
        }
        Value::String(s) => {
            let re = Regex::new(r"\d+").expect("static regex");
            let numbers: Vec<f64> = re
                .find_iter(s)
                .filter_map(|m| m.as_str().parse().ok())
                .collect();
            match numbers.as_slice() {
                [] => None,
                [single] => Some(ExperienceRange { min: *single, max: *single }),
                [min, max, ..] => Some(ExperienceRange {
                    min: min.min(*max),
                    max: min.max(*max),
                }),
            }
        }
        v => v.as_f64().map(|n| {
            let n = n.max(0.0);
            ExperienceRange { min: n, max: n }
        }),
    }
}

/// Salary extraction: first integer of the literal, multiplied by 1000
/// when it carries a `k` suffix.
fn normalize_salary(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::String(s) => {
            let mut amount = first_integer(s)?;
            if s.to_lowercase().contains('k') {
                amount *= 1000;
            }
            Some(amount as u32)
        }
        v => v.as_f64().filter(|n| *n >= 0.0).map(|n| n as u32),
    }
}

fn normalize_salary_band(value: Option<&Value>) -> Option<SalaryBand> {
    match value? {
        Value::Object(map) => {
            let min = normalize_salary(map.get("min"))?;
            let max = normalize_salary(map.get("max")).unwrap_or(min);
            Some(SalaryBand {
                min: min.min(max),
                max: min.max(max),
            })
        }
        Value::String(s) => {
            let re = Regex::new(r"\d+").expect("static regex");
            let mut numbers: Vec<u64> = re
                .find_iter(&s.replace(' ', ""))
                .filter_map(|m| m.as_str().parse().ok())
                .collect();
            if s.to_lowercase().contains('k') {
                numbers = numbers.into_iter().map(|n| n * 1000).collect();
            }
            match numbers.as_slice() {
                [] => None,
                [single] => Some(expand_single_value(*single as u32)),
                [a, b, ..] => Some(SalaryBand {
                    min: *a.min(b) as u32,
                    max: *a.max(b) as u32,
                }),
            }
        }
        v => v
            .as_f64()
            .filter(|n| *n >= 0.0)
            .map(|n| expand_single_value(n as u32)),
    }
}

/// A single salary value widens into a ±10% band.
fn expand_single_value(value: u32) -> SalaryBand {
    SalaryBand {
        min: (value as f64 * 0.9).round() as u32,
        max: (value as f64 * 1.1).round() as u32,
    }
}

fn normalize_contract_set(value: Option<&Value>) -> Vec<ContractType> {
    let labels: Vec<String> = match value {
        Some(Value::String(s)) => s.split([',', ';']).map(str::to_string).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    let mut contracts = Vec::new();
    for label in labels {
        if let Some(contract) = ContractType::from_label(&label) {
            if !contracts.contains(&contract) {
                contracts.push(contract);
            }
        }
    }
    contracts
}

fn normalize_remote_preference(value: Option<&Value>) -> RemotePreference {
    let Some(raw) = value.and_then(Value::as_str) else {
        return RemotePreference::Unspecified;
    };
    let folded = text::fold(raw);

    const REMOTE: &[&str] = &["full remote", "remote", "télétravail", "teletravail", "totalement"];
    const HYBRID: &[&str] = &["hybrid", "hybride", "mixte", "partiel", "partial"];
    const ONSITE: &[&str] = &["onsite", "présentiel", "presentiel", "bureau", "sur site"];

    if HYBRID.iter().any(|k| folded.contains(k)) {
        RemotePreference::Hybrid
    } else if REMOTE.iter().any(|k| folded.contains(k)) {
        RemotePreference::Remote
    } else if ONSITE.iter().any(|k| folded.contains(k)) {
        RemotePreference::Onsite
    } else {
        RemotePreference::Unspecified
    }
}

fn normalize_remote_policy(raw: &str) -> Option<RemotePolicy> {
    let folded = text::fold(raw);
    if folded.contains("majorit") || folded.contains("majority") {
        return Some(RemotePolicy::HybridMajority);
    }
    if folded.contains("partiel") || folded.contains("partial") || folded.contains("hybrid")
        || folded.contains("hybride") || folded.contains("mixte")
    {
        return Some(RemotePolicy::HybridPartial);
    }
    if folded.contains("total") || folded == "remote" || folded == "full"
        || folded.contains("télétravail") || folded.contains("teletravail")
    {
        return Some(RemotePolicy::Remote);
    }
    if folded.contains("onsite") || folded.contains("présentiel") || folded.contains("presentiel")
        || folded.contains("sur site") || folded.contains("bureau")
    {
        return Some(RemotePolicy::Onsite);
    }
    None
}

/// Location: trim, collapse whitespace, capitalize each word. The
/// capitalized string keeps enough of the raw form for geocoding.
fn normalize_location(value: Option<&Value>) -> Option<String> {
    let raw = value.and_then(Value::as_str)?.trim();
    if raw.is_empty() {
        return None;
    }
    Some(text::capitalize_words(&text::collapse_whitespace(raw)))
}

fn normalize_priorities(value: Option<&Value>) -> Option<CandidatePriorities> {
    let map = value?.as_object()?;
    let note = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| map.get(*n))
            .and_then(Value::as_f64)
            .filter(|n| *n > 0.0)
    };

    let priorities = CandidatePriorities {
        evolution: note(&["evolution"]),
        compensation: note(&["compensation", "remuneration"]),
        proximity: note(&["proximity", "proximite"]),
        flexibility: note(&["flexibility", "flexibilite"]),
    };
    if priorities.is_empty() {
        None
    } else {
        Some(priorities)
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => {
            let folded = text::fold(s);
            folded == "true" || folded == "oui" || folded == "yes"
        }
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn is_mobile(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => {
            let folded = text::fold(s);
            folded.contains("mobile") || folded.contains("disponible")
        }
        other => truthy(other),
    }
}

fn is_valid_departure(time: &str) -> bool {
    let parts: Vec<&str> = time.split(':').collect();
    if parts.len() != 2 {
        return false;
    }
    let hour: Option<u32> = parts[0].parse().ok();
    let minute: Option<u32> = parts[1].parse().ok();
    matches!((hour, minute), (Some(h), Some(m)) if h < 24 && m < 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candidate_requires_skills() {
        let err = canonicalize_candidate(&json!({"name": "Alice"})).unwrap_err();
        assert!(err.to_string().contains("skills"));
    }

    #[test]
    fn skills_are_split_trimmed_and_deduplicated() {
        let candidate = canonicalize_candidate(&json!({
            "skills": "python, django ;PYTHON; c, sql"
        }))
        .unwrap();
        assert_eq!(candidate.skills, vec!["Python", "Django", "Sql"]);
    }

    #[test]
    fn experience_parses_first_integer_from_strings() {
        let candidate = canonicalize_candidate(&json!({
            "skills": ["Python"],
            "years_experience": "5 ans d'experience"
        }))
        .unwrap();
        assert_eq!(candidate.years_experience, 5.0);
    }

    #[test]
    fn salary_handles_k_suffix() {
        let candidate = canonicalize_candidate(&json!({
            "skills": ["Python"],
            "salary_expectation": "55K"
        }))
        .unwrap();
        assert_eq!(candidate.salary_expectation, Some(55000));
    }

    #[test]
    fn contract_labels_map_to_canonical_values() {
        let candidate = canonicalize_candidate(&json!({
            "skills": ["Python"],
            "contract_types": ["consultant", "cdi", "contrat pro", "CDI"]
        }))
        .unwrap();
        assert_eq!(
            candidate.contract_types,
            vec![ContractType::Freelance, ContractType::Cdi, ContractType::Apprenticeship]
        );
    }

    #[test]
    fn salary_band_string_and_single_value() {
        let job = canonicalize_job(
            &json!({
                "title": "Dev",
                "required_skills": ["Python"],
                "salary_band": "45-55K"
            }),
            0,
        )
        .unwrap();
        assert_eq!(job.salary_band, Some(SalaryBand { min: 45000, max: 55000 }));

        let job = canonicalize_job(
            &json!({
                "title": "Dev",
                "required_skills": ["Python"],
                "salary_band": 50000
            }),
            0,
        )
        .unwrap();
        let band = job.salary_band.unwrap();
        assert_eq!(band.min, 45000);
        assert_eq!(band.max, 55000);
    }

    #[test]
    fn job_requires_title_and_skills() {
        assert!(canonicalize_job(&json!({"required_skills": ["Python"]}), 0).is_err());
        assert!(canonicalize_job(&json!({"title": "Dev"}), 0).is_err());
    }

    #[test]
    fn remote_policy_lexicon() {
        let policy = |raw: &str| normalize_remote_policy(raw);
        assert_eq!(policy("télétravail total"), Some(RemotePolicy::Remote));
        assert_eq!(policy("hybride partiel"), Some(RemotePolicy::HybridPartial));
        assert_eq!(policy("hybrid_majority"), Some(RemotePolicy::HybridMajority));
        assert_eq!(policy("présentiel"), Some(RemotePolicy::Onsite));
        assert_eq!(policy("whatever"), None);
    }

    #[test]
    fn location_is_capitalized_and_collapsed() {
        let candidate = canonicalize_candidate(&json!({
            "skills": ["Python"],
            "location": "  paris   15e  "
        }))
        .unwrap();
        assert_eq!(candidate.location.as_deref(), Some("Paris 15e"));
    }

    #[test]
    fn canonicalize_is_idempotent_for_candidates() {
        let raw = json!({
            "skills": "python, django",
            "years_experience": "5 ans",
            "location": " paris ",
            "salary_expectation": "55K",
            "contract_types": ["cdi"],
            "remote_preference": "hybride",
            "transport_preference": "transit",
            "priorities": {"compensation": 9, "proximity": 3}
        });
        let once = canonicalize_candidate(&raw).unwrap();
        let round_tripped = serde_json::to_value(&once).unwrap();
        let twice = canonicalize_candidate(&round_tripped).unwrap();
        assert_eq!(format!("{:?}", once), format!("{:?}", twice));
    }

    #[test]
    fn canonicalize_is_idempotent_for_jobs() {
        let raw = json!({
            "title": "Senior Python",
            "required_skills": "python; django; postgresql",
            "salary_band": "50-60K",
            "contract_type": "cdi",
            "remote_policy": "hybride partiel",
            "required_experience": "3-5 ans",
            "location": "paris"
        });
        let once = canonicalize_job(&raw, 0).unwrap();
        let round_tripped = serde_json::to_value(&once).unwrap();
        let twice = canonicalize_job(&round_tripped, 0).unwrap();
        assert_eq!(format!("{:?}", once), format!("{:?}", twice));
    }

    #[test]
    fn priorities_accept_french_aliases() {
        let candidate = canonicalize_candidate(&json!({
            "skills": ["Python"],
            "priorites_candidat": {"remuneration": 9, "proximite": 3}
        }))
        .unwrap();
        let priorities = candidate.priorities.unwrap();
        assert_eq!(priorities.compensation, Some(9.0));
        assert_eq!(priorities.proximity, Some(3.0));
        assert_eq!(priorities.evolution, None);
    }
}
