//! Offline clustering of scraped OSM POIs
//!
//! Buckets POIs into geographic clusters with K-means over (lat, lon) and
//! maps raw OSM tags onto the coarse categories used by the recommender.
//! The city is small enough that Euclidean distance on degrees is adequate.
use geo::Centroid;
use geojson::{feature::Id, GeoJson, JsonObject, JsonValue};
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    store::loader::feature_tags,
};

/// Iteration cap for the K-means refinement loop
pub const MAX_ITERATIONS: usize = 100;

/// OSM `(key, value)` → category; `"*"` matches any value of the key.
/// Checked in order, first match wins.
const CATEGORY_MAP: &[(&str, &str, &str)] = &[
    ("tourism", "attraction", "heritage"),
    ("tourism", "viewpoint", "nature"),
    ("tourism", "museum", "heritage"),
    ("tourism", "theme_park", "adventure"),
    ("historic", "*", "heritage"),
    ("natural", "beach", "nature"),
    ("natural", "peak", "nature"),
    ("natural", "volcano", "nature"),
    ("natural", "waterfall", "nature"),
    ("leisure", "park", "nature"),
    ("amenity", "restaurant", "gastronomy"),
    ("amenity", "cafe", "gastronomy"),
    ("amenity", "fast_food", "gastronomy"),
    ("amenity", "bar", "gastronomy"),
];

const DEFAULT_CATEGORY: &str = "other";

/// Coarse category for a set of OSM tags
pub fn assign_category(tags: &JsonObject) -> &'static str {
    CATEGORY_MAP
        .iter()
        .find(|(key, value, _)| match tags.get(*key) {
            None => false,
            Some(tag) => *value == "*" || tag.as_str() == Some(*value),
        })
        .map(|(_, _, category)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}

/// One row of the clustering output
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClusteredPoi {
    pub osm_id: String,
    pub name: String,
    pub lon: f64,
    pub lat: f64,
    pub raw_tags: String,
    pub category: String,
    pub cluster: usize,
    /// 1 for named places, 0 otherwise
    pub pop_score: u8,
}

/// Assigns each `[lat, lon]` point to one of `k` clusters
///
/// Seeds with the first point and then repeatedly the point farthest from
/// every chosen center, so results are deterministic. Iterates until no
/// assignment changes or `max_iters` is reached.
pub fn kmeans(points: &[[f64; 2]], k: usize, max_iters: usize) -> Vec<usize> {
    if points.is_empty() || k == 0 {
        return vec![];
    }
    if k >= points.len() {
        return (0..points.len()).collect();
    }

    let mut centers: Vec<[f64; 2]> = Vec::with_capacity(k);
    centers.push(points[0]);

    for _ in 1..k {
        let mut best_idx = 0;
        let mut best_dist = 0.0;
        for (i, p) in points.iter().enumerate() {
            let min_dist = centers
                .iter()
                .map(|c| squared_distance(p, c))
                .fold(f64::INFINITY, f64::min);
            if min_dist > best_dist {
                best_dist = min_dist;
                best_idx = i;
            }
        }
        centers.push(points[best_idx]);
    }

    // usize::MAX forces every point to be assigned on the first pass
    let mut assignments = vec![usize::MAX; points.len()];

    for _ in 0..max_iters {
        let mut changed = false;
        for (i, p) in points.iter().enumerate() {
            let nearest = nearest_center(p, &centers);
            if assignments[i] != nearest {
                assignments[i] = nearest;
                changed = true;
            }
        }

        if !changed {
            break;
        }

        let mut sums = vec![[0.0, 0.0]; k];
        let mut counts = vec![0usize; k];
        for (i, p) in points.iter().enumerate() {
            let cluster = assignments[i];
            sums[cluster][0] += p[0];
            sums[cluster][1] += p[1];
            counts[cluster] += 1;
        }
        for j in 0..k {
            if counts[j] > 0 {
                centers[j] = [sums[j][0] / counts[j] as f64, sums[j][1] / counts[j] as f64];
            }
        }
    }

    assignments
}

/// Clusters every feature of a GeoJSON FeatureCollection into `k` groups
///
/// Features are placed at their geometry centroid; those without a usable
/// geometry are dropped.
pub fn cluster_geojson(raw: &str, k: usize) -> AppResult<Vec<ClusteredPoi>> {
    let geojson: GeoJson = raw
        .parse()
        .map_err(|e| AppError::InvalidInput(format!("Invalid GeoJSON: {}", e)))?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(AppError::InvalidInput(
            "Expected a GeoJSON FeatureCollection".to_string(),
        ));
    };

    let mut pois = Vec::new();
    for feature in collection.features {
        let Some(centroid) = feature
            .geometry
            .clone()
            .and_then(|g| geo::Geometry::<f64>::try_from(g).ok())
            .and_then(|g| g.centroid())
        else {
            continue;
        };

        let properties = feature.properties.clone().unwrap_or_default();
        let tags = feature_tags(&properties);
        let name = tags
            .get("name")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();

        pois.push(ClusteredPoi {
            osm_id: osm_id(feature.id.as_ref(), &properties),
            pop_score: u8::from(!name.is_empty()),
            name,
            lon: centroid.x(),
            lat: centroid.y(),
            raw_tags: serde_json::to_string(&tags)?,
            category: assign_category(&tags).to_string(),
            cluster: 0,
        });
    }

    let points: Vec<[f64; 2]> = pois.iter().map(|p| [p.lat, p.lon]).collect();
    for (poi, cluster) in pois.iter_mut().zip(kmeans(&points, k, MAX_ITERATIONS)) {
        poi.cluster = cluster;
    }

    Ok(pois)
}

fn osm_id(id: Option<&Id>, properties: &JsonObject) -> String {
    match id {
        Some(Id::String(s)) => s.clone(),
        Some(Id::Number(n)) => n.to_string(),
        None => ["@id", "osm_id", "id"]
            .iter()
            .find_map(|key| match properties.get(*key) {
                Some(JsonValue::String(s)) => Some(s.clone()),
                Some(JsonValue::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_default(),
    }
}

fn nearest_center(p: &[f64; 2], centers: &[[f64; 2]]) -> usize {
    let mut best_cluster = 0;
    let mut best_dist = f64::INFINITY;
    for (j, c) in centers.iter().enumerate() {
        let dist = squared_distance(p, c);
        if dist < best_dist {
            best_dist = dist;
            best_cluster = j;
        }
    }
    best_cluster
}

fn squared_distance(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags(value: serde_json::Value) -> JsonObject {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_assign_category_wildcard_matches_null_tag() {
        assert_eq!(assign_category(&tags(json!({"historic": null}))), "heritage");
        // Exact-value entries still need a matching string
        assert_eq!(assign_category(&tags(json!({"natural": null}))), "other");
    }

    #[test]
    fn test_assign_category_specific_matches() {
        assert_eq!(assign_category(&tags(json!({"tourism": "museum"}))), "heritage");
        assert_eq!(assign_category(&tags(json!({"tourism": "viewpoint"}))), "nature");
        assert_eq!(assign_category(&tags(json!({"natural": "volcano"}))), "nature");
        assert_eq!(assign_category(&tags(json!({"amenity": "cafe"}))), "gastronomy");
        assert_eq!(assign_category(&tags(json!({"tourism": "theme_park"}))), "adventure");
    }

    #[test]
    fn test_assign_category_wildcard_and_default() {
        assert_eq!(assign_category(&tags(json!({"historic": "ruins"}))), "heritage");
        assert_eq!(assign_category(&tags(json!({"shop": "mall"}))), "other");
        assert_eq!(assign_category(&tags(json!({"amenity": "bank"}))), "other");
    }

    #[test]
    fn test_assign_category_first_match_wins() {
        // tourism=attraction precedes amenity=restaurant in the table
        let t = tags(json!({"amenity": "restaurant", "tourism": "attraction"}));
        assert_eq!(assign_category(&t), "heritage");
    }

    #[test]
    fn test_kmeans_separates_two_groups() {
        let points = vec![
            [13.14, 123.73],
            [13.15, 123.74],
            [13.14, 123.74],
            [13.40, 123.50],
            [13.41, 123.51],
        ];
        let labels = kmeans(&points, 2, 100);
        assert_eq!(labels.len(), 5);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_cluster_geojson() {
        let raw = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "id": "node/1",
                    "geometry": {"type": "Point", "coordinates": [123.735, 13.142]},
                    "properties": {"name": "Legazpi Cathedral", "amenity": "place_of_worship"}
                },
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [123.742, 13.143]},
                    "properties": {"@id": "node/2", "tags": {"amenity": "cafe"}}
                },
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[123.68, 13.25], [123.69, 13.25], [123.69, 13.26], [123.68, 13.26], [123.68, 13.25]]]
                    },
                    "properties": {"osm_id": 3, "name": "Mayon Volcano", "natural": "volcano"}
                },
                {"type": "Feature", "geometry": null, "properties": {"name": "Nowhere"}}
            ]
        })
        .to_string();

        let pois = cluster_geojson(&raw, 2).unwrap();
        assert_eq!(pois.len(), 3);

        assert_eq!(pois[0].osm_id, "node/1");
        assert_eq!(pois[0].category, "other");
        assert_eq!(pois[0].pop_score, 1);

        assert_eq!(pois[1].osm_id, "node/2");
        assert_eq!(pois[1].category, "gastronomy");
        assert_eq!(pois[1].pop_score, 0);
        assert_eq!(pois[1].raw_tags, r#"{"amenity":"cafe"}"#);

        assert_eq!(pois[2].osm_id, "3");
        assert_eq!(pois[2].category, "nature");
        assert!((pois[2].lon - 123.685).abs() < 1e-9);

        // The two downtown points share a cluster, the volcano does not
        assert_eq!(pois[0].cluster, pois[1].cluster);
        assert_ne!(pois[0].cluster, pois[2].cluster);
    }

    #[test]
    fn test_cluster_geojson_rejects_non_collections() {
        let raw = r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#;
        assert!(cluster_geojson(raw, 2).is_err());
    }

    #[test]
    fn test_kmeans_edge_cases() {
        assert!(kmeans(&[], 3, 10).is_empty());
        assert!(kmeans(&[[1.0, 1.0]], 0, 10).is_empty());
        assert_eq!(kmeans(&[[1.0, 1.0], [2.0, 2.0]], 5, 10), vec![0, 1]);
    }
}
