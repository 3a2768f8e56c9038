/// Hybrid next-POI recommender
///
/// Merges several scoring strategies into one ranking. Observed transitions
/// from real visit sequences dominate; same-theme proximity, precomputed
/// classifier predictions, nearby POIs of varied themes and a live
/// classifier query fill in when the stronger signals run short.
use std::{collections::HashMap, sync::Arc};

use tracing::instrument;

use crate::{
    models::{
        PoiId, PopularRoute, Recommendation, RecommendationSource, RecommenderStats, RouteStop,
    },
    services::{
        classifier::{predict_next, RouteClassifier},
        smart_cache::SmartCache,
    },
    store::PoiStore,
};

const TRANSITION_WEIGHT: f64 = 2.0;
const TRANSITION_MERGE_FACTOR: f64 = 0.5;
const MAX_TRANSITIONS: usize = 8;

const THEME_WEIGHT: f64 = 0.15;
const THEME_MERGE_FACTOR: f64 = 0.1;
const MAX_THEME_POIS: usize = 5;

const CACHED_CLASSIFIER_WEIGHT: f64 = 1.8;
const CACHED_CLASSIFIER_MERGE_FACTOR: f64 = 0.4;
const MAX_CACHED_PREDICTIONS: usize = 8;

/// Manhattan distance (degrees) within which a POI counts as nearby
const NEARBY_RADIUS: f64 = 0.5;
const NEARBY_WEIGHT: f64 = 0.5;
const NEW_THEME_BONUS: f64 = 0.2;

const REALTIME_CLASSIFIER_WEIGHT: f64 = 1.3;
const REALTIME_CLASSIFIER_MERGE_FACTOR: f64 = 0.5;
const MAX_REALTIME_PREDICTIONS: usize = 3;

/// Distance assumed for pairs missing from the distance matrix
const UNKNOWN_DISTANCE: f64 = 999.0;

const STARTING_POIS_PER_THEME: usize = 3;
const FALLBACK_SCORE: f64 = 0.5;

/// A recommendation being assembled from one or more strategies
#[derive(Debug, Clone)]
struct Candidate {
    poi_id: PoiId,
    score: f64,
    reason: String,
    sources: Vec<RecommendationSource>,
}

/// Accumulates candidates keyed by POI id
#[derive(Default)]
struct Scoreboard {
    candidates: HashMap<PoiId, Candidate>,
}

impl Scoreboard {
    fn len(&self) -> usize {
        self.candidates.len()
    }

    fn contains(&self, poi_id: PoiId) -> bool {
        self.candidates.contains_key(&poi_id)
    }

    /// Adds a new candidate, or boosts an existing one by `score * merge_factor`
    fn offer(
        &mut self,
        poi_id: PoiId,
        score: f64,
        merge_factor: f64,
        reason: impl FnOnce() -> String,
        source: RecommendationSource,
    ) {
        match self.candidates.get_mut(&poi_id) {
            Some(existing) => {
                existing.score += score * merge_factor;
                existing.sources.push(source);
            }
            None => {
                self.candidates.insert(
                    poi_id,
                    Candidate {
                        poi_id,
                        score,
                        reason: reason(),
                        sources: vec![source],
                    },
                );
            }
        }
    }

    /// Candidates by descending score, ties by ascending id
    fn into_ranked(self) -> Vec<Candidate> {
        let mut ranked: Vec<Candidate> = self.candidates.into_values().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.poi_id.cmp(&b.poi_id)));
        ranked
    }
}

pub struct HybridRecommender {
    store: Arc<PoiStore>,
    cache: SmartCache,
    classifier: Option<Arc<dyn RouteClassifier>>,
}

impl HybridRecommender {
    pub fn new(
        store: Arc<PoiStore>,
        cache: SmartCache,
        classifier: Option<Arc<dyn RouteClassifier>>,
    ) -> Self {
        Self {
            store,
            cache,
            classifier,
        }
    }

    pub fn store(&self) -> &PoiStore {
        &self.store
    }

    pub fn smart_cache(&self) -> &SmartCache {
        &self.cache
    }

    pub fn classifier_available(&self) -> bool {
        self.classifier.is_some()
    }

    fn distance(&self, from: PoiId, to: PoiId) -> f64 {
        self.cache.distance(from, to).unwrap_or(UNKNOWN_DISTANCE)
    }

    fn finish(&self, ranked: Vec<Candidate>, count: usize) -> Vec<Recommendation> {
        ranked
            .into_iter()
            .filter_map(|candidate| {
                let poi = self.store.get(candidate.poi_id)?;
                let reason = if candidate.sources.len() > 1 {
                    format!(
                        "Highly recommended - {} factors match your preferences",
                        candidate.sources.len()
                    )
                } else {
                    candidate.reason
                };
                Some(Recommendation {
                    poi_id: poi.id,
                    name: poi.name.clone(),
                    theme: poi.theme.clone(),
                    score: candidate.score,
                    reason,
                    coordinates: poi.coordinates(),
                })
            })
            .take(count)
            .collect()
    }

    /// Ranks the next POIs to visit after `route`
    ///
    /// POIs already in the route and ids unknown to the store are never
    /// returned. An empty route yields popular starting points.
    #[instrument(skip(self), fields(route_len = route.len()))]
    pub async fn recommend_next(&self, route: &[PoiId], count: usize) -> Vec<Recommendation> {
        let Some(&last) = route.last() else {
            return self.popular_starting_pois(count);
        };

        let eligible = |poi_id: PoiId| !route.contains(&poi_id) && self.store.contains(poi_id);
        let mut board = Scoreboard::default();

        for transition in self.cache.tables.transitions_from(last).iter().take(MAX_TRANSITIONS) {
            if eligible(transition.poi) {
                board.offer(
                    transition.poi,
                    transition.score * TRANSITION_WEIGHT,
                    TRANSITION_MERGE_FACTOR,
                    || format!("Popular next stop - {} travelers chose this", transition.count),
                    RecommendationSource::RealTransitions,
                );
            }
        }

        // Same-theme proximity only strengthens POIs some other signal found
        if let Some(theme) = self.store.theme_of(last) {
            for &poi_id in self.cache.theme_group(theme).iter().take(MAX_THEME_POIS) {
                if !eligible(poi_id) {
                    continue;
                }
                if let Some(candidate) = board.candidates.get_mut(&poi_id) {
                    let proximity = 1.0 / (1.0 + self.distance(last, poi_id) * 10.0);
                    candidate.score += THEME_WEIGHT * proximity * THEME_MERGE_FACTOR;
                    if !candidate.sources.contains(&RecommendationSource::ThemeMatch) {
                        candidate.sources.push(RecommendationSource::ThemeMatch);
                    }
                }
            }
        }

        for prediction in self
            .cache
            .predictions_for(route)
            .iter()
            .take(MAX_CACHED_PREDICTIONS)
        {
            if eligible(prediction.poi_id) {
                board.offer(
                    prediction.poi_id,
                    prediction.confidence * CACHED_CLASSIFIER_WEIGHT,
                    CACHED_CLASSIFIER_MERGE_FACTOR,
                    || "AI-powered prediction based on your route".to_string(),
                    RecommendationSource::ClassifierCached,
                );
            }
        }

        if board.len() < count {
            let mut nearby: Vec<(PoiId, f64)> = self
                .store
                .ids()
                .filter(|poi_id| eligible(*poi_id) && !board.contains(*poi_id))
                .map(|poi_id| (poi_id, self.distance(last, poi_id)))
                .filter(|(_, distance)| *distance < NEARBY_RADIUS)
                .collect();
            nearby.sort_by(|a, b| a.1.total_cmp(&b.1));

            let mut themes_added: Vec<&str> = Vec::new();
            for (poi_id, distance) in nearby {
                if board.len() >= count {
                    break;
                }
                let Some(theme) = self.store.theme_of(poi_id) else {
                    continue;
                };
                let bonus = if themes_added.contains(&theme) {
                    0.0
                } else {
                    NEW_THEME_BONUS
                };
                board.offer(
                    poi_id,
                    NEARBY_WEIGHT / (1.0 + distance * 5.0) + bonus,
                    0.0,
                    || format!("Nearby {} attraction worth visiting", theme),
                    RecommendationSource::NearbyDiverse,
                );
                themes_added.push(theme);
            }
        }

        if board.len() < count {
            if let Some(classifier) = &self.classifier {
                let predictions = predict_next(classifier.as_ref(), &self.store, route).await;
                for prediction in predictions.iter().take(MAX_REALTIME_PREDICTIONS) {
                    if !eligible(prediction.poi_id) {
                        continue;
                    }
                    // New entries and boosts use different weights here
                    let score = if board.contains(prediction.poi_id) {
                        prediction.confidence * REALTIME_CLASSIFIER_MERGE_FACTOR
                    } else {
                        prediction.confidence * REALTIME_CLASSIFIER_WEIGHT
                    };
                    board.offer(
                        prediction.poi_id,
                        score,
                        1.0,
                        || "Advanced AI recommendation for your route".to_string(),
                        RecommendationSource::ClassifierRealtime,
                    );
                }
            }
        }

        let recommendations = self.finish(board.into_ranked(), count);
        tracing::debug!(
            last_poi = last,
            returned = recommendations.len(),
            "Generated recommendations"
        );
        recommendations
    }

    /// Starting points for an empty route
    ///
    /// Most visited POIs first, then frequent sequence openers, then simply
    /// the first POIs by id when no visit data exists.
    fn popular_starting_pois(&self, count: usize) -> Vec<Recommendation> {
        let mut picks: Vec<Candidate> = Vec::new();

        let most_visited = self.cache.tables.most_visited();
        if let Some(&(_, max_visits)) = most_visited.first() {
            for (poi_id, visits) in most_visited.into_iter().take(count * 2) {
                if let Some(poi) = self.store.get(poi_id) {
                    picks.push(Candidate {
                        poi_id,
                        score: visits as f64 / max_visits as f64,
                        reason: format!("Popular {} attraction - {} visits!", poi.theme, visits),
                        sources: vec![RecommendationSource::PopularStart],
                    });
                }
                if picks.len() >= count {
                    break;
                }
            }
        }

        if picks.len() < count {
            'themes: for (theme, starting) in &self.cache.tables.starting_pois {
                for start in starting.iter().take(STARTING_POIS_PER_THEME) {
                    let seen = picks.iter().any(|c| c.poi_id == start.poi);
                    if !seen && self.store.contains(start.poi) {
                        picks.push(Candidate {
                            poi_id: start.poi,
                            score: start.score,
                            reason: format!("Popular {} starting point", theme),
                            sources: vec![RecommendationSource::PopularStart],
                        });
                    }
                    if picks.len() >= count {
                        break 'themes;
                    }
                }
            }
        }

        if picks.is_empty() {
            tracing::warn!("No visit data available, recommending first POIs");
            picks = self
                .store
                .all()
                .take(count)
                .map(|poi| Candidate {
                    poi_id: poi.id,
                    score: FALLBACK_SCORE,
                    reason: format!("Discover this {} attraction", poi.theme),
                    sources: vec![RecommendationSource::Fallback],
                })
                .collect();
        }

        picks.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.poi_id.cmp(&b.poi_id)));
        self.finish(picks, count)
    }

    /// Most common complete visit sequences, POIs resolved by name
    pub fn popular_routes(&self, limit: usize) -> Vec<PopularRoute> {
        self.cache
            .tables
            .popular_sequences
            .iter()
            .take(limit)
            .map(|seq| PopularRoute {
                pois: seq
                    .sequence
                    .iter()
                    .filter_map(|id| self.store.get(*id))
                    .map(|poi| RouteStop {
                        id: poi.id,
                        name: poi.name.clone(),
                        theme: poi.theme.clone(),
                    })
                    .collect(),
                score: seq.score,
                count: seq.count,
            })
            .collect()
    }

    pub fn stats(&self) -> RecommenderStats {
        let tables = &self.cache.tables;
        RecommenderStats {
            total_pois: self.store.len(),
            cached_classifier_predictions: self.cache.classifier_predictions.len(),
            real_user_sequences: tables.popular_sequences.len(),
            starting_poi_patterns: tables.starting_pattern_count(),
            transition_patterns: tables.transition_pattern_count(),
            classifier_available: self.classifier_available(),
        }
    }
}
