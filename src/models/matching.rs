use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::candidate::TransportMode;

/// A scoring axis. Every variant reports a value for each dimension it
/// considers and zero weight elsewhere.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Skills,
    Experience,
    Salary,
    Proximity,
    Flexibility,
    Culture,
    Contract,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::Skills,
        Dimension::Experience,
        Dimension::Salary,
        Dimension::Proximity,
        Dimension::Flexibility,
        Dimension::Culture,
        Dimension::Contract,
    ];

    pub fn to_str(&self) -> &str {
        match self {
            Dimension::Skills => "skills",
            Dimension::Experience => "experience",
            Dimension::Salary => "salary",
            Dimension::Proximity => "proximity",
            Dimension::Flexibility => "flexibility",
            Dimension::Culture => "culture",
            Dimension::Contract => "contract",
        }
    }
}

/// Per-request weight distribution over dimensions. The weight resolver
/// is the sole producer of normalized vectors; components always sum to
/// 1.0 within floating tolerance.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct WeightVector {
    weights: HashMap<Dimension, f64>,
}

impl WeightVector {
    pub fn from_pairs(pairs: &[(Dimension, f64)]) -> Self {
        let weights = pairs.iter().copied().collect();
        WeightVector { weights }
    }

    pub fn get(&self, dim: Dimension) -> f64 {
        self.weights.get(&dim).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, dim: Dimension, weight: f64) {
        self.weights.insert(dim, weight);
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        self.weights.iter().map(|(d, w)| (*d, *w))
    }

    /// Rescales all components so they sum to 1.0. A zero vector is left
    /// untouched.
    pub fn normalize(&mut self) {
        let total = self.sum();
        if total > f64::EPSILON {
            for weight in self.weights.values_mut() {
                *weight /= total;
            }
        }
    }

    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() <= 1e-6 && self.weights.values().all(|w| *w >= 0.0)
    }
}

/// One dimension's contribution to a match: the raw subscore in [0,1],
/// the weight it carried, and a short human-readable explanation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DimensionScore {
    pub value: f64,
    pub weight: f64,
    pub explanation: String,
}

impl DimensionScore {
    pub fn new(value: f64, explanation: impl Into<String>) -> Self {
        DimensionScore {
            value: value.clamp(0.0, 1.0),
            weight: 0.0,
            explanation: explanation.into(),
        }
    }

    pub fn weighted(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TravelSource {
    Real,
    Simulated,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TransitLeg {
    pub line: String,
    pub vehicle: String,
}

/// Resolved travel information for one origin/destination pair.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TravelResult {
    pub duration_minutes: u32,
    pub distance_km: f64,
    pub mode: TransportMode,
    pub source: TravelSource,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transit_legs: Option<Vec<TransitLeg>>,
}

/// Outcome of a travel-time lookup. `Unavailable` only occurs when both
/// the real and simulated paths are disabled.
#[derive(Debug, Clone, PartialEq)]
pub enum TravelOutcome {
    Found(TravelResult),
    Unavailable,
}

/// A scored job for one candidate. `global_score` is an integer in
/// [0,100] and is never mutated after the variant composed it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchResult {
    pub job_id: String,
    pub title: String,
    pub global_score: u32,
    pub per_dimension: HashMap<Dimension, DimensionScore>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel_info: Option<TravelResult>,
    pub algorithm_used: String,
    pub fallback_used: bool,
    /// Per-variant global scores, present in comparison mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm_scores: Option<HashMap<String, u32>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Success,
    Fallback,
    Error,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MatchMeta {
    pub total_offers: usize,
    pub returned: usize,
    pub avg_score: f64,
    pub avg_confidence: f64,
}

/// The envelope every matching call returns, regardless of outcome.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchResponse {
    pub status: MatchStatus,
    pub algorithm_used: String,
    pub execution_time_s: f64,
    pub results: Vec<MatchResult>,
    pub meta: MatchMeta,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
}
