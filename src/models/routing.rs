use std::{fmt::Display, str::FromStr};

use geojson::{Geometry, Value};
use serde::{Deserialize, Serialize};

/// `[lon, lat]` pair, the coordinate order used by the routing engines
pub type LonLat = [f64; 2];

/// Mode of travel a route is computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelProfile {
    Car,
    Bicycle,
    Foot,
}

impl TravelProfile {
    pub const ALL: [TravelProfile; 3] = [
        TravelProfile::Car,
        TravelProfile::Bicycle,
        TravelProfile::Foot,
    ];

    /// Key used in responses and cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelProfile::Car => "car",
            TravelProfile::Bicycle => "bicycle",
            TravelProfile::Foot => "foot",
        }
    }

    /// Profile segment of an OSRM `/route/v1/{profile}/...` path
    pub fn osrm_profile(&self) -> &'static str {
        match self {
            TravelProfile::Car => "driving",
            TravelProfile::Bicycle => "cycling",
            TravelProfile::Foot => "foot",
        }
    }

    /// Valhalla costing model
    pub fn valhalla_costing(&self) -> &'static str {
        match self {
            TravelProfile::Car => "auto",
            TravelProfile::Bicycle => "bicycle",
            TravelProfile::Foot => "pedestrian",
        }
    }

    /// Lenient parse: unknown names fall back to driving
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or(TravelProfile::Car)
    }
}

impl FromStr for TravelProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "car" | "driving" | "auto" => Ok(TravelProfile::Car),
            "bicycle" | "cycling" | "bike" => Ok(TravelProfile::Bicycle),
            "foot" | "walking" | "pedestrian" => Ok(TravelProfile::Foot),
            other => Err(format!("unknown travel profile: {}", other)),
        }
    }
}

impl Display for TravelProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reshaped routing engine answer for one origin/destination pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteSummary {
    /// Travel time in whole minutes
    pub duration: f64,
    /// Distance in metres
    pub distance: f64,
    /// GeoJSON LineString
    pub geometry: Geometry,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

impl RouteSummary {
    /// Vertices of the route geometry as `[lon, lat]` pairs
    pub fn vertices(&self) -> Vec<LonLat> {
        line_vertices(&self.geometry)
    }
}

/// Straight two-point LineString between `from` and `to`
pub fn straight_line(from: LonLat, to: LonLat) -> Geometry {
    Geometry::new(Value::LineString(vec![from.to_vec(), to.to_vec()]))
}

/// `[lon, lat]` vertices of a LineString geometry; other geometry types yield nothing
pub fn line_vertices(geometry: &Geometry) -> Vec<LonLat> {
    match &geometry.value {
        Value::LineString(positions) => positions
            .iter()
            .filter(|p| p.len() >= 2)
            .map(|p| [p[0], p[1]])
            .collect(),
        _ => Vec::new(),
    }
}

/// Human-readable distance: kilometres with one decimal from 1 km up, whole metres below
pub fn format_distance(meters: f64) -> String {
    if meters >= 1000.0 {
        format!("{:.1} km", meters / 1000.0)
    } else {
        format!("{} m", meters.round() as i64)
    }
}

// ============================================================================
// OSRM API Types
// ============================================================================

/// Response of OSRM `GET /route/v1/...`
#[derive(Debug, Clone, Deserialize)]
pub struct OsrmRouteResponse {
    pub code: String,
    #[serde(default)]
    pub routes: Vec<OsrmRoute>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsrmRoute {
    /// Seconds
    pub duration: f64,
    /// Metres
    pub distance: f64,
    pub geometry: Geometry,
}

impl From<OsrmRoute> for RouteSummary {
    fn from(route: OsrmRoute) -> Self {
        RouteSummary {
            duration: (route.duration / 60.0).round(),
            distance: route.distance,
            geometry: route.geometry,
            fallback: false,
        }
    }
}

// ============================================================================
// Valhalla API Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ValhallaRouteRequest {
    pub locations: Vec<ValhallaLocation>,
    pub costing: String,
    pub directions_options: ValhallaDirectionsOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValhallaLocation {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValhallaDirectionsOptions {
    pub units: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValhallaRouteResponse {
    pub trip: ValhallaTrip,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValhallaTrip {
    pub locations: Vec<ValhallaLocation>,
    pub summary: ValhallaSummary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValhallaSummary {
    /// Kilometres
    pub length: f64,
    /// Seconds
    pub time: f64,
}

impl From<ValhallaTrip> for RouteSummary {
    fn from(trip: ValhallaTrip) -> Self {
        let positions = trip
            .locations
            .iter()
            .map(|loc| vec![loc.lon, loc.lat])
            .collect();

        RouteSummary {
            duration: (trip.summary.time / 60.0).round(),
            distance: trip.summary.length * 1000.0,
            geometry: Geometry::new(Value::LineString(positions)),
            fallback: false,
        }
    }
}
