use geo::{Distance, Haversine, Point};
use serde::Serialize;

use crate::{models::PoiId, store::PoiStore};

/// Rating assumed for POIs that have none
const DEFAULT_RATING: f64 = 4.0;
const RATING_WEIGHT: f64 = 0.7;
const PROXIMITY_WEIGHT: f64 = 0.3;
/// Floor on distance so a POI at the user's exact position stays finite
const MIN_DISTANCE_KM: f64 = 0.001;

/// A POI scored against the user's current position
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NearbyPoi {
    pub id: PoiId,
    pub name: String,
    pub theme: String,
    pub latitude: f64,
    pub longitude: f64,
    pub rating: f64,
    pub distance_km: f64,
    pub score: f64,
}

/// Ranks POIs around `(lat, lon)` by rating and proximity
///
/// `themes` filters case-insensitively; an empty list keeps every theme.
pub fn recommend_near(
    store: &PoiStore,
    lat: f64,
    lon: f64,
    themes: &[String],
    limit: usize,
) -> Vec<NearbyPoi> {
    let origin = Point::new(lon, lat);

    let mut scored: Vec<NearbyPoi> = store
        .all()
        .filter(|poi| {
            themes.is_empty() || themes.iter().any(|t| poi.theme.eq_ignore_ascii_case(t))
        })
        .map(|poi| {
            let distance_km = Haversine::distance(origin, poi.point()) / 1000.0;
            let rating = poi.rating.unwrap_or(DEFAULT_RATING);
            NearbyPoi {
                id: poi.id,
                name: poi.name.clone(),
                theme: poi.theme.clone(),
                latitude: poi.lat,
                longitude: poi.lon,
                rating,
                distance_km,
                score: rating * RATING_WEIGHT
                    + (1.0 / distance_km.max(MIN_DISTANCE_KM)) * PROXIMITY_WEIGHT,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Poi;

    fn store() -> PoiStore {
        let mut rated = Poi::new(3, "Embarcadero", "Waterfront", 13.143, 123.742);
        rated.rating = Some(5.0);
        PoiStore::from_pois(vec![
            Poi::new(1, "Legazpi Cathedral", "Religious", 13.142, 123.735),
            Poi::new(2, "Cagsawa Ruins", "Historical", 13.136, 123.746),
            rated,
            Poi::new(4, "Mayon Viewpoint", "Scenic", 13.257, 123.685),
        ])
    }

    #[test]
    fn test_closest_poi_ranks_first() {
        let results = recommend_near(&store(), 13.1421, 123.7351, &[], 10);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].id, 1);
        assert!(results[0].distance_km < 0.05);
        assert_eq!(results[3].id, 4);
    }

    #[test]
    fn test_exact_position_stays_finite() {
        let results = recommend_near(&store(), 13.142, 123.735, &[], 1);
        assert_eq!(results[0].id, 1);
        assert_eq!(results[0].distance_km, 0.0);
        assert!((results[0].score - (4.0 * 0.7 + 1000.0 * 0.3)).abs() < 1e-9);
    }

    #[test]
    fn test_theme_filter_is_case_insensitive() {
        let themes = vec!["waterfront".to_string(), "SCENIC".to_string()];
        let results = recommend_near(&store(), 13.142, 123.735, &themes, 10);
        let ids: Vec<PoiId> = results.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(results[0].rating, 5.0);
    }

    #[test]
    fn test_limit_and_no_match() {
        assert_eq!(recommend_near(&store(), 13.142, 123.735, &[], 2).len(), 2);
        let none = recommend_near(&store(), 13.142, 123.735, &["Casino".to_string()], 5);
        assert!(none.is_empty());
    }
}
