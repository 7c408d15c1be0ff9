use crate::models::{
    candidate::CandidatePriorities,
    matching::{Dimension, WeightVector},
};

/// Default base distribution used when a variant does not publish its
/// own.
pub fn default_base_weights() -> WeightVector {
    WeightVector::from_pairs(&[
        (Dimension::Skills, 0.30),
        (Dimension::Experience, 0.20),
        (Dimension::Salary, 0.25),
        (Dimension::Proximity, 0.20),
        (Dimension::Flexibility, 0.05),
    ])
}

/// Scoring dimensions each priority lever influences.
fn lever_targets(dimension: Dimension) -> &'static [PriorityLever] {
    match dimension {
        Dimension::Skills | Dimension::Experience => &[PriorityLever::Evolution],
        Dimension::Salary => &[PriorityLever::Compensation],
        Dimension::Proximity => &[PriorityLever::Proximity],
        Dimension::Flexibility => &[PriorityLever::Flexibility],
        Dimension::Culture | Dimension::Contract => &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PriorityLever {
    Evolution,
    Compensation,
    Proximity,
    Flexibility,
}

fn lever_note(priorities: &CandidatePriorities, lever: PriorityLever) -> Option<f64> {
    match lever {
        PriorityLever::Evolution => priorities.evolution,
        PriorityLever::Compensation => priorities.compensation,
        PriorityLever::Proximity => priorities.proximity,
        PriorityLever::Flexibility => priorities.flexibility,
    }
}

/// Converts a clamped 1..10 note into a weight multiplier: 1 -> 0.5,
/// 5.5 -> 1.0, 10 -> 2.0.
fn note_multiplier(note: f64) -> f64 {
    let note = note.clamp(1.0, 10.0);
    0.5 + (note - 1.0) * (1.5 / 9.0)
}

/// Derives the per-request weight vector from the candidate's declared
/// priorities. Multipliers from several levers combine by geometric
/// mean, then the vector is renormalized to sum to 1.0.
pub fn resolve_weights(
    base: &WeightVector,
    priorities: Option<&CandidatePriorities>,
) -> WeightVector {
    let Some(priorities) = priorities.filter(|p| !p.is_empty()) else {
        let mut weights = base.clone();
        weights.normalize();
        return weights;
    };

    let mut adjusted = WeightVector::default();
    for (dimension, base_weight) in base.dimensions() {
        let multipliers: Vec<f64> = lever_targets(dimension)
            .iter()
            .filter_map(|lever| lever_note(priorities, *lever))
            .map(note_multiplier)
            .collect();

        let factor = if multipliers.is_empty() {
            1.0
        } else {
            let product: f64 = multipliers.iter().product();
            product.powf(1.0 / multipliers.len() as f64)
        };

        adjusted.set(dimension, base_weight * factor);
    }

    adjusted.normalize();
    debug_assert!(adjusted.is_normalized());
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_priorities_returns_base_unchanged() {
        let base = default_base_weights();
        let resolved = resolve_weights(&base, None);
        for (dimension, weight) in base.dimensions() {
            assert!((resolved.get(dimension) - weight).abs() < 1e-9);
        }
        assert!(resolved.is_normalized());
    }

    #[test]
    fn note_multiplier_endpoints() {
        assert!((note_multiplier(1.0) - 0.5).abs() < 1e-9);
        assert!((note_multiplier(5.5) - 1.0).abs() < 1e-9);
        assert!((note_multiplier(10.0) - 2.0).abs() < 1e-9);
        // Out-of-range notes are clamped first.
        assert!((note_multiplier(0.0) - 0.5).abs() < 1e-9);
        assert!((note_multiplier(42.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn resolved_vector_always_sums_to_one() {
        let priorities = CandidatePriorities {
            evolution: Some(10.0),
            compensation: Some(1.0),
            proximity: Some(7.0),
            flexibility: None,
        };
        let resolved = resolve_weights(&default_base_weights(), Some(&priorities));
        assert!(resolved.is_normalized(), "sum was {}", resolved.sum());
    }

    #[test]
    fn high_compensation_note_outweighs_low_proximity_note() {
        let priorities = CandidatePriorities {
            compensation: Some(9.0),
            proximity: Some(3.0),
            ..Default::default()
        };
        let resolved = resolve_weights(&default_base_weights(), Some(&priorities));
        assert!(resolved.get(Dimension::Salary) > resolved.get(Dimension::Proximity));
        // Salary rose above its base share, proximity dropped below.
        assert!(resolved.get(Dimension::Salary) > 0.25);
        assert!(resolved.get(Dimension::Proximity) < 0.20);
    }

    #[test]
    fn evolution_lever_moves_skills_and_experience_together() {
        let priorities = CandidatePriorities {
            evolution: Some(10.0),
            ..Default::default()
        };
        let base = default_base_weights();
        let resolved = resolve_weights(&base, Some(&priorities));
        let skills_ratio = resolved.get(Dimension::Skills) / base.get(Dimension::Skills);
        let exp_ratio = resolved.get(Dimension::Experience) / base.get(Dimension::Experience);
        assert!((skills_ratio - exp_ratio).abs() < 1e-9);
        assert!(skills_ratio > 1.0);
    }
}
