use serde::{Deserialize, Serialize};

/// Integer identifier of a point of interest
pub type PoiId = i64;

/// A named, categorized location in the city
///
/// Immutable after load; the POI store owns every instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Poi {
    pub id: PoiId,
    pub name: String,
    pub full_name: Option<String>,
    pub theme: String,
    pub lat: f64,
    pub lon: f64,
    pub rating: Option<f64>,
    pub description: Option<String>,
}

impl Poi {
    pub fn new(
        id: PoiId,
        name: impl Into<String>,
        theme: impl Into<String>,
        lat: f64,
        lon: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            full_name: None,
            theme: theme.into(),
            lat,
            lon,
            rating: None,
            description: None,
        }
    }

    /// `[lon, lat]`, the order used by GeoJSON and the routing engines
    pub fn coordinates(&self) -> [f64; 2] {
        [self.lon, self.lat]
    }

    pub fn point(&self) -> geo::Point<f64> {
        geo::Point::new(self.lon, self.lat)
    }

    /// Name shown to clients when no long name was loaded
    pub fn display_full_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.name)
    }
}

/// Number of POIs carrying each theme
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ThemeCount {
    pub theme: String,
    pub count: usize,
}
