use std::collections::BTreeMap;

use crate::models::{Poi, PoiId, ThemeCount};

/// In-memory POI table, keyed by id
///
/// Built once at startup and shared read-only between requests.
#[derive(Debug, Clone, Default)]
pub struct PoiStore {
    pois: BTreeMap<PoiId, Poi>,
}

impl PoiStore {
    /// Builds the table; when an id repeats, the first POI wins
    pub fn from_pois(pois: impl IntoIterator<Item = Poi>) -> Self {
        let mut table = BTreeMap::new();
        for poi in pois {
            if table.contains_key(&poi.id) {
                tracing::warn!(poi_id = poi.id, name = %poi.name, "Duplicate POI id skipped");
                continue;
            }
            table.insert(poi.id, poi);
        }
        Self { pois: table }
    }

    pub fn get(&self, id: PoiId) -> Option<&Poi> {
        self.pois.get(&id)
    }

    pub fn contains(&self, id: PoiId) -> bool {
        self.pois.contains_key(&id)
    }

    /// All POIs in ascending id order
    pub fn all(&self) -> impl Iterator<Item = &Poi> {
        self.pois.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = PoiId> + '_ {
        self.pois.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.pois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pois.is_empty()
    }

    pub fn theme_of(&self, id: PoiId) -> Option<&str> {
        self.pois.get(&id).map(|p| p.theme.as_str())
    }

    /// POIs with the given theme (case-insensitive), in id order
    pub fn by_theme<'a>(&'a self, theme: &'a str) -> impl Iterator<Item = &'a Poi> + 'a {
        self.pois
            .values()
            .filter(move |p| p.theme.eq_ignore_ascii_case(theme))
    }

    /// Distinct themes sorted by name, with the number of POIs in each
    pub fn themes(&self) -> Vec<ThemeCount> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for poi in self.pois.values() {
            *counts.entry(poi.theme.as_str()).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(theme, count)| ThemeCount {
                theme: theme.to_string(),
                count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PoiStore {
        PoiStore::from_pois(vec![
            Poi::new(3, "Mayon Viewpoint", "Scenic", 13.257, 123.685),
            Poi::new(1, "Legazpi Cathedral", "Religious", 13.142, 123.735),
            Poi::new(2, "Cagsawa Ruins", "Historical", 13.136, 123.746),
            Poi::new(4, "St. Raphael Church", "Religious", 13.145, 123.750),
        ])
    }

    #[test]
    fn test_all_is_ordered_by_id() {
        let ids: Vec<PoiId> = store().all().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let store = PoiStore::from_pois(vec![
            Poi::new(1, "First", "A", 0.0, 0.0),
            Poi::new(1, "Second", "B", 0.0, 0.0),
        ]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(1).unwrap().name, "First");
    }

    #[test]
    fn test_themes_with_counts() {
        let themes = store().themes();
        assert_eq!(
            themes,
            vec![
                ThemeCount { theme: "Historical".to_string(), count: 1 },
                ThemeCount { theme: "Religious".to_string(), count: 2 },
                ThemeCount { theme: "Scenic".to_string(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_by_theme_is_case_insensitive() {
        let store = store();
        let ids: Vec<PoiId> = store.by_theme("religious").map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(store.theme_of(2), Some("Historical"));
        assert_eq!(store.theme_of(99), None);
    }
}
