//! Flat-file loaders for the POI table and the historical visit log.

use std::{fs::File, io::Read, path::Path};

use csv::{ReaderBuilder, Trim};
use geo::Centroid;
use geojson::{GeoJson, JsonObject, JsonValue};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::{Poi, PoiId, VisitRecord, VisitRow},
    services::clustering::assign_category,
};

use super::PoiStore;

/// Raw POI row, as found in `POI-<city>.csv`
#[derive(Debug, Deserialize)]
struct PoiRow {
    #[serde(rename = "poiID")]
    id: PoiId,
    #[serde(rename = "poiName")]
    name: String,
    #[serde(rename = "poiLongName", default)]
    long_name: Option<String>,
    theme: String,
    lat: f64,
    #[serde(rename = "long")]
    lon: f64,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    description: Option<String>,
}

impl From<PoiRow> for Poi {
    fn from(row: PoiRow) -> Self {
        Poi {
            id: row.id,
            name: row.name,
            full_name: row.long_name.filter(|s| !s.is_empty()),
            theme: row.theme,
            lat: row.lat,
            lon: row.lon,
            rating: row.rating,
            description: row.description.filter(|s| !s.is_empty()),
        }
    }
}

/// Loads the POI table, choosing the format from the file extension
pub fn load_pois(path: impl AsRef<Path>, delimiter: u8) -> AppResult<PoiStore> {
    let path = path.as_ref();
    let is_geojson = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("geojson") || e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let pois = if is_geojson {
        load_pois_geojson(path)?
    } else {
        load_pois_csv(path, delimiter)?
    };

    tracing::info!(path = %path.display(), count = pois.len(), "Loaded POIs");
    Ok(PoiStore::from_pois(pois))
}

/// Reads POIs from CSV; malformed rows are logged and skipped
pub fn load_pois_csv(path: impl AsRef<Path>, delimiter: u8) -> AppResult<Vec<Poi>> {
    let file = File::open(path.as_ref())?;
    read_pois_csv(file, delimiter)
}

pub fn read_pois_csv<R: Read>(reader: R, delimiter: u8) -> AppResult<Vec<Poi>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .trim(Trim::All)
        .from_reader(reader);

    let mut pois = Vec::new();
    for (line, row) in reader.deserialize::<PoiRow>().enumerate() {
        match row {
            Ok(row) => pois.push(Poi::from(row)),
            Err(e) => tracing::warn!(line = line + 2, error = %e, "Skipping malformed POI row"),
        }
    }
    Ok(pois)
}

/// Reads POIs from an OSM-derived GeoJSON FeatureCollection
///
/// Each feature is placed at its geometry's centroid. Features without a
/// usable geometry are skipped; features without an id are numbered after
/// the largest id seen.
pub fn load_pois_geojson(path: impl AsRef<Path>) -> AppResult<Vec<Poi>> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    parse_pois_geojson(&raw)
}

pub fn parse_pois_geojson(raw: &str) -> AppResult<Vec<Poi>> {
    let geojson: GeoJson = raw
        .parse()
        .map_err(|e| AppError::InvalidInput(format!("Invalid GeoJSON: {}", e)))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(collection) => collection,
        _ => {
            return Err(AppError::InvalidInput(
                "GeoJSON POI file must be a FeatureCollection".to_string(),
            ))
        }
    };

    let mut pending = Vec::new();
    let mut max_id: PoiId = 0;

    for feature in collection.features {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let Some(centroid) = geo::Geometry::<f64>::try_from(geometry)
            .ok()
            .and_then(|g| g.centroid())
        else {
            continue;
        };

        let properties = feature.properties.unwrap_or_default();
        let tags = feature_tags(&properties);

        let id = property_id(&properties);
        if let Some(id) = id {
            max_id = max_id.max(id);
        }

        let name = string_property(&tags, "name")
            .or_else(|| string_property(&properties, "name"))
            .unwrap_or_default();
        let theme = string_property(&properties, "theme")
            .or_else(|| string_property(&properties, "category"))
            .unwrap_or_else(|| assign_category(&tags).to_string());

        let mut poi = Poi::new(0, name, theme, centroid.y(), centroid.x());
        poi.rating = properties.get("rating").and_then(JsonValue::as_f64);
        poi.description = string_property(&properties, "description");
        pending.push((id, poi));
    }

    let mut next_id = max_id + 1;
    let pois = pending
        .into_iter()
        .map(|(id, mut poi)| {
            poi.id = id.unwrap_or_else(|| {
                let id = next_id;
                next_id += 1;
                id
            });
            poi
        })
        .collect();

    Ok(pois)
}

/// OSM tags of a feature; osmium exports may flatten them into the properties
pub(crate) fn feature_tags(properties: &JsonObject) -> JsonObject {
    match properties.get("tags") {
        Some(JsonValue::Object(tags)) => tags.clone(),
        _ => properties.clone(),
    }
}

fn property_id(properties: &JsonObject) -> Option<PoiId> {
    ["poiID", "id"].iter().find_map(|key| match properties.get(*key) {
        Some(JsonValue::Number(n)) => n.as_i64(),
        Some(JsonValue::String(s)) => s.parse().ok(),
        _ => None,
    })
}

fn string_property(properties: &JsonObject, key: &str) -> Option<String> {
    properties
        .get(key)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Loads the visit log; a missing file yields an empty log
pub fn load_visits(path: impl AsRef<Path>, delimiter: u8) -> AppResult<Vec<VisitRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!(
            path = %path.display(),
            "Visit log not found, continuing without visit data"
        );
        return Ok(Vec::new());
    }

    let visits = read_visits_csv(File::open(path)?, delimiter)?;
    tracing::info!(path = %path.display(), count = visits.len(), "Loaded visit log");
    Ok(visits)
}

pub fn read_visits_csv<R: Read>(reader: R, delimiter: u8) -> AppResult<Vec<VisitRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .trim(Trim::All)
        .from_reader(reader);

    let mut visits = Vec::new();
    for (line, row) in reader.deserialize::<VisitRow>().enumerate() {
        match row {
            Ok(row) => visits.push(VisitRecord::from(row)),
            Err(e) => tracing::warn!(line = line + 2, error = %e, "Skipping malformed visit row"),
        }
    }
    Ok(visits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const POI_CSV: &str = "\
poiID,poiName,theme,lat,long,rating
1,Legazpi Cathedral,Religious,13.142,123.735,4.5
2,Cagsawa Ruins,Historical,13.136,123.746,
x,Broken Row,Historical,13.0,123.0,
3,\"Embarcadero, Legazpi\",Waterfront,13.143,123.742,4.3
";

    #[test]
    fn test_read_pois_csv() {
        let pois = read_pois_csv(POI_CSV.as_bytes(), b',').unwrap();
        assert_eq!(pois.len(), 3);
        assert_eq!(pois[0].name, "Legazpi Cathedral");
        assert_eq!(pois[0].rating, Some(4.5));
        assert_eq!(pois[1].rating, None);
        assert_eq!(pois[2].name, "Embarcadero, Legazpi");
        assert_eq!(pois[2].lon, 123.742);
    }

    #[test]
    fn test_read_pois_semicolon_with_long_name() {
        let csv = "poiID;poiName;poiLongName;theme;lat;long\n\
                   7;Daraga;Daraga Church;Religious;13.15;123.71\n";
        let pois = read_pois_csv(csv.as_bytes(), b';').unwrap();
        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].display_full_name(), "Daraga Church");
    }

    #[test]
    fn test_read_visits_ignores_extra_columns() {
        let csv = "\
photoID,userID,dateTaken,poiID,poiTheme,poiFreq,seqID
100,u1,1000,1,Religious,5,1
101,u1,2000,2,Historical,3,1
102,u2,not-a-time,2,Historical,3,2
";
        let visits = read_visits_csv(csv.as_bytes(), b',').unwrap();
        assert_eq!(visits.len(), 2);
        assert_eq!(visits[1], VisitRecord::new("u1", 1, 2, 2000));
    }

    #[test]
    fn test_load_visits_missing_file_is_empty() {
        let visits = load_visits("/definitely/not/here.csv", b',').unwrap();
        assert!(visits.is_empty());
    }

    #[test]
    fn test_load_pois_from_file_builds_store() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(POI_CSV.as_bytes()).unwrap();

        let store = load_pois(file.path(), b',').unwrap();
        assert_eq!(store.len(), 3);
        assert!(store.contains(3));
    }

    #[test]
    fn test_parse_pois_geojson() {
        let raw = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [123.746, 13.136]},
                    "properties": {"id": 10, "tags": {"name": "Cagsawa Ruins", "historic": "ruins"}}
                },
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[123.0, 13.0], [123.2, 13.0], [123.2, 13.2], [123.0, 13.2], [123.0, 13.0]]]
                    },
                    "properties": {"name": "Albay Park", "leisure": "park"}
                },
                {
                    "type": "Feature",
                    "geometry": null,
                    "properties": {"name": "Nowhere"}
                }
            ]
        }"#;

        let pois = parse_pois_geojson(raw).unwrap();
        assert_eq!(pois.len(), 2);

        assert_eq!(pois[0].id, 10);
        assert_eq!(pois[0].name, "Cagsawa Ruins");
        assert_eq!(pois[0].theme, "heritage");

        assert_eq!(pois[1].id, 11);
        assert_eq!(pois[1].theme, "nature");
        assert!((pois[1].lat - 13.1).abs() < 1e-9);
        assert!((pois[1].lon - 123.1).abs() < 1e-9);
    }

    #[test]
    fn test_parse_pois_geojson_rejects_single_feature() {
        let raw = r#"{"type": "Feature", "geometry": null, "properties": {}}"#;
        assert!(matches!(
            parse_pois_geojson(raw),
            Err(AppError::InvalidInput(_))
        ));
    }
}
