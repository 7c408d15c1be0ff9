use serde::{Deserialize, Serialize};

use crate::models::candidate::ContractType;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemotePolicy {
    Onsite,
    HybridPartial,
    HybridMajority,
    Remote,
}

impl RemotePolicy {
    pub fn is_hybrid(&self) -> bool {
        matches!(self, RemotePolicy::HybridPartial | RemotePolicy::HybridMajority)
    }
}

/// Annual salary band in a single currency, `min <= max` enforced by the
/// canonicalizer.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct SalaryBand {
    pub min: u32,
    pub max: u32,
}

/// Experience requirement as a range of years; single-valued inputs use
/// `min == max`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ExperienceRange {
    pub min: f64,
    pub max: f64,
}

/// Canonical job posting, immutable once canonicalized.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct JobPosting {
    pub id: String,
    pub title: String,
    pub company: String,
    pub required_skills: Vec<String>,
    pub essential_skills: Vec<String>,
    pub desired_soft_skills: Vec<String>,
    pub required_experience: Option<ExperienceRange>,
    pub contract_type: Option<ContractType>,
    pub location: Option<String>,
    pub remote_policy: Option<RemotePolicy>,
    pub salary_band: Option<SalaryBand>,
    pub benefits: Vec<String>,
    pub company_culture: Vec<String>,
    pub flexible_hours: bool,
    pub rtt_days: u32,
}
