use std::fmt::Display;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::models::{LonLat, PoiId, TravelProfile};

#[derive(Debug, Clone, PartialEq)]
pub enum CacheKey {
    /// One origin/destination pair for one travel profile
    Route {
        from: LonLat,
        to: LonLat,
        profile: TravelProfile,
    },
    /// Recommendations for an exact visited route and result count
    Recommendation { route: Vec<PoiId>, count: usize },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Route { from, to, profile } => write!(
                f,
                "route:{}:{},{};{},{}",
                profile, from[0], from[1], to[0], to[1]
            ),
            CacheKey::Recommendation { route, count } => {
                let ids: Vec<String> = route.iter().map(|id| id.to_string()).collect();
                write!(f, "recommend:{}:{}", count, ids.join(","))
            }
        }
    }
}

/// Hit/miss counters and occupancy of a cache
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheInfo {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub maxsize: usize,
    pub hit_rate: String,
}

struct CacheInner {
    entries: LruCache<String, String>,
    hits: u64,
    misses: u64,
}

/// Size-bounded, least-recently-used memo cache
///
/// Values are stored serialized as JSON under the key's display form. There
/// is no expiry: entries leave only through eviction or [`Cache::clear`].
#[derive(Clone)]
pub struct Cache {
    inner: Arc<Mutex<CacheInner>>,
}

impl Cache {
    /// Creates a cache holding at most `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            })),
        }
    }

    /// Retrieves a value from the cache by key
    ///
    /// A hit marks the entry as most recently used. Returns `None` on a miss.
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut inner = self.inner.lock().await;
        let cached = inner.entries.get(&key.to_string()).cloned();

        match cached {
            Some(json) => {
                inner.hits += 1;
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(data))
            }
            None => {
                inner.misses += 1;
                Ok(None)
            }
        }
    }

    /// Stores a value, evicting the least recently used entry when full
    ///
    /// Serialization failures are logged and the value is simply not cached.
    pub async fn insert<T: Serialize>(&self, key: &CacheKey, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, key = %key, "Cache serialization error");
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        inner.entries.put(key.to_string(), json);
    }

    /// Drops every entry and resets the counters
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    pub async fn info(&self) -> CacheInfo {
        let inner = self.inner.lock().await;
        let lookups = inner.hits + inner.misses;
        let hit_rate = if lookups > 0 {
            format!("{:.2}%", inner.hits as f64 / lookups as f64 * 100.0)
        } else {
            "0%".to_string()
        };

        CacheInfo {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.entries.len(),
            maxsize: inner.entries.cap().get(),
            hit_rate,
        }
    }
}
