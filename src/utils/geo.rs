// utils/geo.rs
use crate::utils::text;

/// Coordinates of the cities the simulated estimator knows. Free-form
/// locality strings are matched by substring against these names.
const CITY_COORDS: &[(&str, f64, f64)] = &[
    ("paris", 48.8566, 2.3522),
    ("lyon", 45.7640, 4.8357),
    ("marseille", 43.2965, 5.3698),
    ("toulouse", 43.6047, 1.4442),
    ("nice", 43.7102, 7.2620),
    ("bordeaux", 44.8378, -0.5792),
    ("lille", 50.6292, 3.0573),
    ("nantes", 47.2184, -1.5536),
    ("strasbourg", 48.5734, 7.7521),
    ("montpellier", 43.6108, 3.8767),
    ("rennes", 48.1173, -1.6778),
    ("versailles", 48.8014, 2.1301),
    ("grenoble", 45.1885, 5.7245),
    ("rouen", 49.4431, 1.0993),
    ("dijon", 47.3220, 5.0415),
];

fn known_city(location: &str) -> Option<(f64, f64)> {
    let folded = text::fold(location);
    CITY_COORDS
        .iter()
        .find(|(name, _, _)| folded.contains(name))
        .map(|(_, lat, lon)| (*lat, *lon))
}

fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let r = 6371.0;
    let d_lat = (b.0 - a.0).to_radians();
    let d_lon = (b.1 - a.1).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.0.to_radians().cos() * b.0.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * r * h.sqrt().asin()
}

/// True when either locality string contains the other, case-insensitive.
pub fn same_city(a: &str, b: &str) -> bool {
    let a = text::fold(a);
    let b = text::fold(b);
    !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a))
}

/// Deterministic distance estimate between two locality strings.
///
/// Known city pairs use great-circle distance. Same-city strings come
/// out short; anything else degrades to an edit-distance heuristic so
/// the estimator always yields a plausible positive value.
pub fn estimate_distance_km(origin: &str, destination: &str) -> f64 {
    if same_city(origin, destination) {
        return 4.0;
    }
    match (known_city(origin), known_city(destination)) {
        (Some(a), Some(b)) => {
            let d = haversine_km(a, b);
            if d < 1.0 {
                4.0
            } else {
                d
            }
        }
        _ => {
            let d = text::levenshtein(&text::fold(origin), &text::fold(destination));
            ((d * 15) as f64).clamp(20.0, 600.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_city_matches_substrings_both_ways() {
        assert!(same_city("Paris", "75002 Paris, France"));
        assert!(same_city("20 Rue de la Paix, Paris", "paris"));
        assert!(!same_city("Lyon", "Paris"));
    }

    #[test]
    fn known_pairs_use_real_distance() {
        let d = estimate_distance_km("Paris, France", "Lyon, France");
        assert!(d > 350.0 && d < 450.0, "Paris-Lyon estimate {d}");
    }

    #[test]
    fn unknown_pairs_are_positive_and_deterministic() {
        let d1 = estimate_distance_km("Trifouillis", "Perpette-les-Oies");
        let d2 = estimate_distance_km("Trifouillis", "Perpette-les-Oies");
        assert!(d1 >= 20.0 && d1 <= 600.0);
        assert_eq!(d1, d2);
    }

    #[test]
    fn same_city_estimate_is_short() {
        assert_eq!(estimate_distance_km("Paris", "Paris 15e"), 4.0);
    }
}
