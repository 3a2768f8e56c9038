/// A macro to simplify memoization through a [`Cache`](crate::cache::Cache).
///
/// This macro checks if a value is present in the cache.
/// If found, it returns the cached value.
/// If not found, it executes the provided future to compute the value,
/// stores it in the cache, and then returns the computed value.
/// Errors from the future are returned as-is and nothing is cached.
///
/// # Arguments
/// * `$cache`: The cache instance to use for retrieval and storage.
/// * `$key`: The [`CacheKey`](crate::cache::CacheKey) to store the value under.
/// * `$block`: The future to await if the value is not found in cache.
///
/// # Example
/// ```rust,ignore
/// async fn route(&self, from: LonLat, to: LonLat) -> AppResult<RouteSummary> {
///     cached!(self.cache, CacheKey::Route { from, to, profile }, async move {
///         self.engine.route(from, to, profile).await
///     })
/// }
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $block:expr) => {{
        let key = $key;
        // Attempt to get the value from cache
        if let Some(cached) = $cache.get_from_cache(&key).await? {
            Ok(cached)
        } else {
            // If not in cache, execute the block to compute the value
            let value = $block.await?;
            // Store the computed value in cache
            $cache.insert(&key, &value).await;
            Ok(value)
        }
    }};
}
