use serde::{Deserialize, Serialize};

use super::PoiId;

/// Scoring strategy that contributed to a recommendation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    /// Observed transitions from the last visited POI
    RealTransitions,
    /// Same theme as the last visited POI
    ThemeMatch,
    /// Classifier prediction precomputed for this exact route
    ClassifierCached,
    /// Close to the last visited POI, preferring unseen themes
    NearbyDiverse,
    /// Classifier queried while serving the request
    ClassifierRealtime,
    /// Frequently visited or frequently first in a sequence
    PopularStart,
    /// No visit data at all
    Fallback,
}

/// A ranked suggestion for the next POI to visit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub poi_id: PoiId,
    pub name: String,
    pub theme: String,
    pub score: f64,
    pub reason: String,
    /// `[lon, lat]`
    pub coordinates: [f64; 2],
}

/// One resolved classifier output: a POI and the classifier's confidence in it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClassifierPrediction {
    pub poi_id: PoiId,
    pub confidence: f64,
}

/// Summary counters describing the loaded recommendation structures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommenderStats {
    pub total_pois: usize,
    pub cached_classifier_predictions: usize,
    pub real_user_sequences: usize,
    pub starting_poi_patterns: usize,
    pub transition_patterns: usize,
    pub classifier_available: bool,
}

/// A POI as listed inside a popular route
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteStop {
    pub id: PoiId,
    pub name: String,
    pub theme: String,
}

/// A visit sequence many travelers followed, with its POIs resolved
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PopularRoute {
    pub pois: Vec<RouteStop>,
    pub score: f64,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_serialization() {
        let json = serde_json::to_string(&RecommendationSource::RealTransitions).unwrap();
        assert_eq!(json, "\"real_transitions\"");
        let json = serde_json::to_string(&RecommendationSource::ClassifierCached).unwrap();
        assert_eq!(json, "\"classifier_cached\"");
    }
}
