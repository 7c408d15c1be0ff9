use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContractType {
    Cdi,
    Cdd,
    Freelance,
    Internship,
    Apprenticeship,
}

impl ContractType {
    pub fn to_str(&self) -> &str {
        match self {
            ContractType::Cdi => "CDI",
            ContractType::Cdd => "CDD",
            ContractType::Freelance => "FREELANCE",
            ContractType::Internship => "INTERNSHIP",
            ContractType::Apprenticeship => "APPRENTICESHIP",
        }
    }

    /// Maps a raw contract label to its canonical form. Recognizes the
    /// French labels used by upstream questionnaires.
    pub fn from_label(label: &str) -> Option<ContractType> {
        let folded = label.trim().to_lowercase();
        match folded.as_str() {
            "cdi" => Some(ContractType::Cdi),
            "cdd" => Some(ContractType::Cdd),
            "freelance" | "consultant" | "independant" | "indépendant" => {
                Some(ContractType::Freelance)
            }
            "stage" | "internship" | "intern" => Some(ContractType::Internship),
            "alternance" | "apprentissage" | "contrat pro" | "apprenticeship" => {
                Some(ContractType::Apprenticeship)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemotePreference {
    Onsite,
    Hybrid,
    Remote,
    #[default]
    Unspecified,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Driving,
    Transit,
    Walking,
    Cycling,
}

impl TransportMode {
    /// Mode value expected by the routing API query string.
    pub fn api_mode(&self) -> &str {
        match self {
            TransportMode::Driving => "driving",
            TransportMode::Transit => "transit",
            TransportMode::Walking => "walking",
            TransportMode::Cycling => "bicycling",
        }
    }

    pub fn label(&self) -> &str {
        match self {
            TransportMode::Driving => "by car",
            TransportMode::Transit => "by public transport",
            TransportMode::Walking => "on foot",
            TransportMode::Cycling => "by bicycle",
        }
    }

    pub fn from_label(label: &str) -> Option<TransportMode> {
        match label.trim().to_lowercase().as_str() {
            "driving" | "car" | "voiture" => Some(TransportMode::Driving),
            "transit" | "public transport" | "transport en commun" => Some(TransportMode::Transit),
            "walking" | "marche" | "a pied" | "à pied" => Some(TransportMode::Walking),
            "cycling" | "bicycling" | "velo" | "vélo" | "bike" => Some(TransportMode::Cycling),
            _ => None,
        }
    }
}

/// Priority notes (1..10) a candidate puts on each coarse lever.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct CandidatePriorities {
    pub evolution: Option<f64>,
    pub compensation: Option<f64>,
    pub proximity: Option<f64>,
    pub flexibility: Option<f64>,
}

impl CandidatePriorities {
    pub fn is_empty(&self) -> bool {
        self.evolution.is_none()
            && self.compensation.is_none()
            && self.proximity.is_none()
            && self.flexibility.is_none()
    }
}

/// Canonical candidate record. Produced by the canonicalizer only and
/// never mutated afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub skills: Vec<String>,
    pub soft_skills: Vec<String>,
    pub years_experience: f64,
    pub location: Option<String>,
    pub mobile: bool,
    pub salary_expectation: Option<u32>,
    pub contract_types: Vec<ContractType>,
    pub remote_preference: RemotePreference,
    pub transport_preference: TransportMode,
    pub departure_time: Option<String>,
    pub max_commute_minutes: u32,
    pub priorities: Option<CandidatePriorities>,
    pub values: Vec<String>,
    pub culture_preferences: Vec<String>,
    pub wants_flexible_hours: bool,
    pub rtt_important: bool,
}

impl Candidate {
    pub fn has_priorities(&self) -> bool {
        self.priorities.map(|p| !p.is_empty()).unwrap_or(false)
    }
}
