//! Visit duration and transition time estimates mined from the visit log.

use std::collections::{BTreeMap, HashMap};

use geo::{Distance, Haversine};

use crate::models::{Poi, PoiId, VisitRecord};
use crate::store::PoiStore;

/// Visit duration used when a POI has no usable observations
const DEFAULT_VISIT_HOURS: f64 = 1.5;

/// Blended walking/driving speed for straight-line travel estimates
const AVERAGE_SPEED_KMH: f64 = 15.0;

/// Fixed overhead added to every transition (parking, orientation)
const TRANSITION_BUFFER_HOURS: f64 = 0.25;

/// Observed gaps outside these bounds are treated as outliers
const VISIT_GAP_HOURS: (f64, f64) = (0.1, 12.0);
const TRANSITION_GAP_HOURS: (f64, f64) = (0.1, 10.0);

fn default_visit_hours(theme: &str) -> f64 {
    match theme {
        "Restaurant" => 1.5,
        "Cafe" => 1.0,
        "Hotel" => 12.0,
        "Park" => 2.0,
        "Religious" => 1.0,
        "Bar" => 2.0,
        "Mall" => 2.5,
        "Tourist_Attraction" => 2.0,
        "Historical_Landmark" => 1.5,
        "Hill" => 2.5,
        "Adventure" => 3.0,
        "ATV" => 2.0,
        "Church" => 1.0,
        "Resort" => 4.0,
        "Sports" => 2.0,
        "Bakery" => 0.5,
        "Spa" => 2.0,
        "Zoo" => 3.0,
        "Mountain_Biking" => 3.0,
        "Food" => 1.5,
        _ => DEFAULT_VISIT_HOURS,
    }
}

/// Great-circle distance in kilometres
pub fn haversine_km(a: &Poi, b: &Poi) -> f64 {
    Haversine::distance(a.point(), b.point()) / 1000.0
}

/// Visits grouped by sequence id, each ordered by timestamp
fn sequences(visits: &[VisitRecord]) -> BTreeMap<i64, Vec<&VisitRecord>> {
    let mut grouped: BTreeMap<i64, Vec<&VisitRecord>> = BTreeMap::new();
    for visit in visits {
        grouped.entry(visit.seq_id).or_default().push(visit);
    }
    for seq in grouped.values_mut() {
        seq.sort_by_key(|v| v.timestamp);
    }
    grouped
}

fn gap_hours(from: &VisitRecord, to: &VisitRecord) -> f64 {
    (to.timestamp - from.timestamp) as f64 / 3600.0
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Estimated hours spent at each POI
///
/// For every sequence containing the POI, the gap between its first
/// occurrence and the next visit counts as one observation. The median of
/// observations within bounds is used; otherwise a per-theme default.
pub fn infer_visit_hours(store: &PoiStore, visits: &[VisitRecord]) -> HashMap<PoiId, f64> {
    let mut observations: HashMap<PoiId, Vec<f64>> = HashMap::new();

    for seq in sequences(visits).values() {
        let mut seen = Vec::new();
        for (i, visit) in seq.iter().enumerate() {
            if seen.contains(&visit.poi_id) {
                continue;
            }
            seen.push(visit.poi_id);

            if let Some(next) = seq.get(i + 1) {
                let gap = gap_hours(visit, next);
                if gap > VISIT_GAP_HOURS.0 && gap < VISIT_GAP_HOURS.1 {
                    observations.entry(visit.poi_id).or_default().push(gap);
                }
            }
        }
    }

    store
        .all()
        .map(|poi| {
            let hours = observations
                .get_mut(&poi.id)
                .and_then(|gaps| median(gaps))
                .unwrap_or_else(|| default_visit_hours(&poi.theme));
            (poi.id, hours)
        })
        .collect()
}

/// Estimated travel hours between every ordered pair of POIs
///
/// Starts from straight-line distance at an average speed plus a fixed
/// buffer, then averages in each observed consecutive gap within bounds.
pub fn infer_transition_hours(
    store: &PoiStore,
    visits: &[VisitRecord],
) -> HashMap<(PoiId, PoiId), f64> {
    let mut times = HashMap::new();
    for a in store.all() {
        for b in store.all() {
            let distance = if a.id == b.id { 0.0 } else { haversine_km(a, b) };
            times.insert(
                (a.id, b.id),
                distance / AVERAGE_SPEED_KMH + TRANSITION_BUFFER_HOURS,
            );
        }
    }

    for seq in sequences(visits).values() {
        for pair in seq.windows(2) {
            let gap = gap_hours(pair[0], pair[1]);
            if gap > TRANSITION_GAP_HOURS.0 && gap < TRANSITION_GAP_HOURS.1 {
                if let Some(estimate) = times.get_mut(&(pair[0].poi_id, pair[1].poi_id)) {
                    *estimate = (*estimate + gap) / 2.0;
                }
            }
        }
    }

    times
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PoiStore {
        PoiStore::from_pois(vec![
            Poi::new(1, "Cathedral", "Church", 13.142, 123.735),
            Poi::new(2, "Cagsawa Ruins", "Historical_Landmark", 13.136, 123.746),
            Poi::new(3, "Embarcadero", "Mall", 13.143, 123.742),
            Poi::new(4, "Unknown Theme", "Lighthouse", 13.15, 123.75),
        ])
    }

    #[test]
    fn test_haversine_km() {
        let a = Poi::new(1, "a", "x", 13.142, 123.735);
        let b = Poi::new(2, "b", "x", 13.136, 123.746);
        let d = haversine_km(&a, &b);
        assert!((d - 1.36).abs() < 0.05, "distance was {}", d);
        assert_eq!(haversine_km(&a, &a), 0.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }

    #[test]
    fn test_visit_hours_from_observations_and_defaults() {
        let visits = vec![
            // seq 1: 1 -> 2 after 1h, 2 -> 3 after 13h (outlier)
            VisitRecord::new("u1", 1, 1, 0),
            VisitRecord::new("u1", 1, 2, 3600),
            VisitRecord::new("u1", 1, 3, 3600 + 13 * 3600),
            // seq 2: 1 -> 3 after 2h (logged out of order)
            VisitRecord::new("u2", 2, 3, 10_000 + 7200),
            VisitRecord::new("u2", 2, 1, 10_000),
        ];

        let hours = infer_visit_hours(&store(), &visits);
        assert_eq!(hours[&1], 1.5); // median of 1h and 2h
        assert_eq!(hours[&2], 1.5); // outlier only: Historical_Landmark default
        assert_eq!(hours[&3], 2.5); // last in both sequences: Mall default
        assert_eq!(hours[&4], DEFAULT_VISIT_HOURS);
    }

    #[test]
    fn test_transition_hours_refined_by_observations() {
        let store = store();
        let visits = vec![
            VisitRecord::new("u1", 1, 1, 0),
            VisitRecord::new("u1", 1, 2, 1800),
        ];

        let times = infer_transition_hours(&store, &visits);
        let a = store.get(1).unwrap();
        let b = store.get(2).unwrap();
        let base = haversine_km(a, b) / AVERAGE_SPEED_KMH + TRANSITION_BUFFER_HOURS;

        assert!((times[&(1, 2)] - (base + 0.5) / 2.0).abs() < 1e-9);
        assert!((times[&(2, 1)] - base).abs() < 1e-9);
        assert_eq!(times[&(3, 3)], TRANSITION_BUFFER_HOURS);
        assert_eq!(times.len(), 16);
    }
}
