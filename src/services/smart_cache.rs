//! Precomputed recommendation structures, persisted as JSON between restarts.

use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    models::{ClassifierPrediction, PoiId, VisitRecord},
    services::{
        classifier::{predict_next, RouteClassifier},
        transitions::TransitionTables,
    },
    store::PoiStore,
};

const STARTING_POIS_PER_THEME: usize = 3;
const SINGLE_POI_ROUTES: usize = 10;
const EXTENDED_ROUTE_SEEDS: usize = 5;
const EXTENSIONS_PER_SEED: usize = 3;
const MAX_CACHED_ROUTES: usize = 50;

/// Classifier output stored for one exact route
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedPrediction {
    pub route: Vec<PoiId>,
    pub predictions: Vec<ClassifierPrediction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartCache {
    pub built_at: DateTime<Utc>,
    /// Number of POIs the cache was built against
    pub poi_count: usize,
    pub tables: TransitionTables,
    pub classifier_predictions: Vec<CachedPrediction>,
    /// Theme to POI ids, ids ascending
    pub theme_groups: BTreeMap<String, Vec<PoiId>>,
    /// Manhattan distance in degrees between distinct POIs
    pub distance_matrix: HashMap<PoiId, HashMap<PoiId, f64>>,
}

fn theme_groups(store: &PoiStore) -> BTreeMap<String, Vec<PoiId>> {
    let mut groups: BTreeMap<String, Vec<PoiId>> = BTreeMap::new();
    for poi in store.all() {
        groups.entry(poi.theme.clone()).or_default().push(poi.id);
    }
    groups
}

fn distance_matrix(store: &PoiStore) -> HashMap<PoiId, HashMap<PoiId, f64>> {
    let mut matrix: HashMap<PoiId, HashMap<PoiId, f64>> = HashMap::new();
    for a in store.all() {
        let row = matrix.entry(a.id).or_default();
        for b in store.all().filter(|b| b.id != a.id) {
            row.insert(b.id, (a.lat - b.lat).abs() + (a.lon - b.lon).abs());
        }
    }
    matrix
}

/// Routes worth asking the classifier about ahead of time
///
/// Popular starting POIs on their own, then the first few extended by their
/// most frequent next stops.
fn candidate_routes(tables: &TransitionTables) -> Vec<Vec<PoiId>> {
    let starting = tables.popular_starting_pois(STARTING_POIS_PER_THEME);

    let mut routes: Vec<Vec<PoiId>> = starting
        .iter()
        .take(SINGLE_POI_ROUTES)
        .map(|poi| vec![*poi])
        .collect();

    for poi in starting.iter().take(EXTENDED_ROUTE_SEEDS) {
        for transition in tables.transitions_from(*poi).iter().take(EXTENSIONS_PER_SEED) {
            routes.push(vec![*poi, transition.poi]);
        }
    }

    routes.truncate(MAX_CACHED_ROUTES);
    routes
}

impl SmartCache {
    /// Builds every structure from the POI table and visit log
    pub async fn build(
        store: &PoiStore,
        visits: &[VisitRecord],
        classifier: Option<&dyn RouteClassifier>,
    ) -> Self {
        let tables = TransitionTables::build(visits, store);

        let mut classifier_predictions = Vec::new();
        if let Some(classifier) = classifier {
            for route in candidate_routes(&tables) {
                let predictions = predict_next(classifier, store, &route).await;
                if !predictions.is_empty() {
                    classifier_predictions.push(CachedPrediction { route, predictions });
                }
            }
            tracing::info!(
                routes = classifier_predictions.len(),
                "Precomputed classifier predictions"
            );
        }

        Self {
            built_at: Utc::now(),
            poi_count: store.len(),
            tables,
            classifier_predictions,
            theme_groups: theme_groups(store),
            distance_matrix: distance_matrix(store),
        }
    }

    /// Reads a cache file; `Ok(None)` when the file does not exist
    pub fn load(path: impl AsRef<Path>) -> AppResult<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> AppResult<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// Loads the cache from `path` when it is readable and matches the POI
    /// table, otherwise rebuilds and saves it
    pub async fn load_or_build(
        path: impl AsRef<Path>,
        store: &PoiStore,
        visits: &[VisitRecord],
        classifier: Option<&dyn RouteClassifier>,
    ) -> Self {
        let path = path.as_ref();

        match Self::load(path) {
            Ok(Some(cache)) if cache.poi_count == store.len() => {
                tracing::info!(
                    path = %path.display(),
                    built_at = %cache.built_at,
                    "Loaded smart cache"
                );
                return cache;
            }
            Ok(Some(cache)) => tracing::info!(
                cached = cache.poi_count,
                current = store.len(),
                "Smart cache built for a different POI table, rebuilding"
            ),
            Ok(None) => tracing::info!(path = %path.display(), "No smart cache found, building"),
            Err(e) => tracing::warn!(error = %e, "Unreadable smart cache, rebuilding"),
        }

        let cache = Self::build(store, visits, classifier).await;
        match cache.save(path) {
            Ok(()) => tracing::info!(path = %path.display(), "Saved smart cache"),
            Err(e) => tracing::warn!(error = %e, "Failed to save smart cache"),
        }
        cache
    }

    /// Manhattan distance between two POIs, `None` for unknown pairs
    pub fn distance(&self, from: PoiId, to: PoiId) -> Option<f64> {
        self.distance_matrix.get(&from)?.get(&to).copied()
    }

    /// Precomputed classifier predictions for exactly this route
    pub fn predictions_for(&self, route: &[PoiId]) -> &[ClassifierPrediction] {
        self.classifier_predictions
            .iter()
            .find(|cached| cached.route == route)
            .map(|cached| cached.predictions.as_slice())
            .unwrap_or(&[])
    }

    pub fn theme_group(&self, theme: &str) -> &[PoiId] {
        self.theme_groups
            .get(theme)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
