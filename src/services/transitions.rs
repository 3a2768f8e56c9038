use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{PoiId, VisitRecord};
use crate::store::PoiStore;

const TOP_STARTING_POIS: usize = 20;
const TOP_TRANSITIONS: usize = 100;
const TOP_SEQUENCES: usize = 50;
const MAX_POPULAR_SEQUENCE_LEN: usize = 6;

/// A POI that often opens a visit sequence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartingPoi {
    pub poi: PoiId,
    /// Count divided by the number of distinct users
    pub score: f64,
    pub count: usize,
}

/// An observed move from one POI to the next
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    pub poi: PoiId,
    /// Count divided by the total number of observed transitions
    pub score: f64,
    pub count: usize,
    pub theme: String,
}

/// A complete visit sequence that several users followed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PopularSequence {
    pub sequence: Vec<PoiId>,
    /// Count divided by the number of multi-POI sequences
    pub score: f64,
    pub count: usize,
}

/// Frequency tables mined from the historical visit log
///
/// Derived data: rebuilt from scratch whenever the smart cache is rebuilt,
/// never updated in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransitionTables {
    /// Top starting POIs grouped by theme
    pub starting_pois: BTreeMap<String, Vec<StartingPoi>>,
    /// Top transitions grouped by origin, most frequent first
    pub transitions: HashMap<PoiId, Vec<Transition>>,
    pub popular_sequences: Vec<PopularSequence>,
    /// Visits per theme across all multi-POI sequences
    pub theme_preferences: BTreeMap<String, usize>,
    /// Total visits per POI across the whole log
    pub visit_counts: BTreeMap<PoiId, usize>,
}

/// Groups the log into per-user, per-sequence POI lists ordered by timestamp
///
/// Sorting is stable, so visits sharing a timestamp keep their log order.
pub fn group_sequences(visits: &[VisitRecord]) -> BTreeMap<(&str, i64), Vec<PoiId>> {
    let mut grouped: BTreeMap<(&str, i64), Vec<&VisitRecord>> = BTreeMap::new();
    for visit in visits {
        grouped
            .entry((visit.user_id.as_str(), visit.seq_id))
            .or_default()
            .push(visit);
    }

    grouped
        .into_iter()
        .map(|(key, mut seq)| {
            seq.sort_by_key(|v| v.timestamp);
            (key, seq.into_iter().map(|v| v.poi_id).collect())
        })
        .collect()
}

/// Sorts counted items by descending count, breaking ties by key
fn ranked<K: Ord + Clone>(counts: HashMap<K, usize>) -> Vec<(K, usize)> {
    let mut items: Vec<(K, usize)> = counts.into_iter().collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    items
}

impl TransitionTables {
    pub fn build(visits: &[VisitRecord], store: &PoiStore) -> Self {
        let sequences = group_sequences(visits);
        let user_count = visits
            .iter()
            .map(|v| v.user_id.as_str())
            .collect::<HashSet<_>>()
            .len();

        let mut starting_counts: HashMap<PoiId, usize> = HashMap::new();
        let mut transition_counts: HashMap<(PoiId, PoiId), usize> = HashMap::new();
        let mut theme_preferences: BTreeMap<String, usize> = BTreeMap::new();
        let mut patterns: Vec<&Vec<PoiId>> = Vec::new();

        for pois in sequences.values().filter(|pois| pois.len() >= 2) {
            *starting_counts.entry(pois[0]).or_default() += 1;
            for pair in pois.windows(2) {
                *transition_counts.entry((pair[0], pair[1])).or_default() += 1;
            }
            for poi in pois {
                if let Some(theme) = store.theme_of(*poi) {
                    *theme_preferences.entry(theme.to_string()).or_default() += 1;
                }
            }
            patterns.push(pois);
        }

        let mut starting_pois: BTreeMap<String, Vec<StartingPoi>> = BTreeMap::new();
        for (poi, count) in ranked(starting_counts).into_iter().take(TOP_STARTING_POIS) {
            if let Some(theme) = store.theme_of(poi) {
                starting_pois
                    .entry(theme.to_string())
                    .or_default()
                    .push(StartingPoi {
                        poi,
                        score: count as f64 / user_count as f64,
                        count,
                    });
            }
        }

        let total_transitions: usize = transition_counts.values().sum();
        let mut transitions: HashMap<PoiId, Vec<Transition>> = HashMap::new();
        for ((from, to), count) in ranked(transition_counts).into_iter().take(TOP_TRANSITIONS) {
            transitions.entry(from).or_default().push(Transition {
                poi: to,
                score: count as f64 / total_transitions as f64,
                count,
                theme: store.theme_of(to).unwrap_or("Unknown").to_string(),
            });
        }

        let mut sequence_counts: HashMap<Vec<PoiId>, usize> = HashMap::new();
        for seq in patterns.iter().filter(|seq| seq.len() <= MAX_POPULAR_SEQUENCE_LEN) {
            *sequence_counts.entry((*seq).clone()).or_default() += 1;
        }
        let popular_sequences = ranked(sequence_counts)
            .into_iter()
            .take(TOP_SEQUENCES)
            .map(|(sequence, count)| PopularSequence {
                sequence,
                score: count as f64 / patterns.len() as f64,
                count,
            })
            .collect();

        let mut visit_counts: BTreeMap<PoiId, usize> = BTreeMap::new();
        for visit in visits {
            *visit_counts.entry(visit.poi_id).or_default() += 1;
        }

        tracing::info!(
            sequences = patterns.len(),
            users = user_count,
            transitions = total_transitions,
            "Analyzed visit patterns"
        );

        Self {
            starting_pois,
            transitions,
            popular_sequences,
            theme_preferences,
            visit_counts,
        }
    }

    /// Most frequent next stops after `poi`, most frequent first
    pub fn transitions_from(&self, poi: PoiId) -> &[Transition] {
        self.transitions.get(&poi).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Starting POIs flattened in theme order, at most `per_theme` from each theme
    pub fn popular_starting_pois(&self, per_theme: usize) -> Vec<PoiId> {
        self.starting_pois
            .values()
            .flat_map(|group| group.iter().take(per_theme).map(|s| s.poi))
            .collect()
    }

    /// POIs by total visits, most visited first (ties by id)
    pub fn most_visited(&self) -> Vec<(PoiId, usize)> {
        let mut items: Vec<(PoiId, usize)> =
            self.visit_counts.iter().map(|(id, count)| (*id, *count)).collect();
        items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        items
    }

    pub fn starting_pattern_count(&self) -> usize {
        self.starting_pois.values().map(Vec::len).sum()
    }

    pub fn transition_pattern_count(&self) -> usize {
        self.transitions.values().map(Vec::len).sum()
    }
}
