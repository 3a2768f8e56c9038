use serde::Deserialize;

use crate::models::TravelProfile;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// City the POI table describes
    #[serde(default = "default_city")]
    pub city: String,

    /// POI table, CSV or GeoJSON (selected by extension)
    #[serde(default = "default_pois_path")]
    pub pois_path: String,

    /// Historical visit log CSV
    #[serde(default = "default_visits_path")]
    pub visits_path: String,

    /// CSV field delimiter; only the first byte is used
    #[serde(default = "default_csv_delimiter")]
    pub csv_delimiter: String,

    /// On-disk cache of precomputed recommendation structures
    #[serde(default = "default_smart_cache_path")]
    pub smart_cache_path: String,

    /// Routing engine backend: "osrm" or "valhalla"
    #[serde(default = "default_routing_engine")]
    pub routing_engine: String,

    #[serde(default = "default_osrm_url")]
    pub osrm_car_url: String,

    #[serde(default = "default_osrm_url")]
    pub osrm_bicycle_url: String,

    #[serde(default = "default_osrm_url")]
    pub osrm_foot_url: String,

    #[serde(default = "default_valhalla_url")]
    pub valhalla_url: String,

    /// Timeout for outbound routing requests, in seconds
    #[serde(default = "default_routing_timeout_secs")]
    pub routing_timeout_secs: u64,

    /// Serve a straight-line route when the routing engine is unreachable
    #[serde(default = "default_route_fallback")]
    pub route_fallback: bool,

    #[serde(default = "default_route_cache_capacity")]
    pub route_cache_capacity: usize,

    #[serde(default = "default_recommendation_cache_capacity")]
    pub recommendation_cache_capacity: usize,

    /// Optional route classifier inference endpoint
    #[serde(default)]
    pub classifier_url: Option<String>,

    /// Comma separated list of allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_allowed_origins: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_city() -> String {
    "Legazpi".to_string()
}

fn default_pois_path() -> String {
    "data/POI-Legazpi.csv".to_string()
}

fn default_visits_path() -> String {
    "data/userVisits-Legazpi.csv".to_string()
}

fn default_csv_delimiter() -> String {
    ",".to_string()
}

fn default_smart_cache_path() -> String {
    "smart_cache.json".to_string()
}

fn default_routing_engine() -> String {
    "osrm".to_string()
}

fn default_osrm_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_valhalla_url() -> String {
    "http://localhost:8002".to_string()
}

fn default_routing_timeout_secs() -> u64 {
    10
}

fn default_route_fallback() -> bool {
    true
}

fn default_route_cache_capacity() -> usize {
    1000
}

fn default_recommendation_cache_capacity() -> usize {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            city: default_city(),
            pois_path: default_pois_path(),
            visits_path: default_visits_path(),
            csv_delimiter: default_csv_delimiter(),
            smart_cache_path: default_smart_cache_path(),
            routing_engine: default_routing_engine(),
            osrm_car_url: default_osrm_url(),
            osrm_bicycle_url: default_osrm_url(),
            osrm_foot_url: default_osrm_url(),
            valhalla_url: default_valhalla_url(),
            routing_timeout_secs: default_routing_timeout_secs(),
            route_fallback: default_route_fallback(),
            route_cache_capacity: default_route_cache_capacity(),
            recommendation_cache_capacity: default_recommendation_cache_capacity(),
            classifier_url: None,
            cors_allowed_origins: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Delimiter byte for the CSV loaders
    pub fn delimiter(&self) -> u8 {
        self.csv_delimiter.bytes().next().unwrap_or(b',')
    }

    /// OSRM base URL serving the given travel profile
    pub fn osrm_url(&self, profile: TravelProfile) -> &str {
        match profile {
            TravelProfile::Car => &self.osrm_car_url,
            TravelProfile::Bicycle => &self.osrm_bicycle_url,
            TravelProfile::Foot => &self.osrm_foot_url,
        }
    }

    /// Parsed CORS origins, empty when any origin is allowed
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
