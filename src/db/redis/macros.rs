/// Read-through caching over [`Cache`](crate::db::Cache).
///
/// Returns the cached value when present. Otherwise awaits `$block`, queues
/// the computed value for a background write and returns it. A failed cache
/// read is logged and treated as a miss so Redis trouble never fails a request;
/// errors from `$block` propagate.
///
/// # Arguments
/// * `$cache`: a value with `get_from_cache` and `set_in_background`
/// * `$key`: the [`CacheKey`](crate::db::CacheKey) to read and write
/// * `$ttl`: time-to-live in seconds for the stored value
/// * `$block`: future computing the value on a miss
///
/// # Example
/// ```rust,ignore
/// let embedding: Vec<f32> = cached!(self.cache, key, ttl, async move {
///     self.inner.embed(text).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        match $cache.get_from_cache(&key).await {
            Ok(Some(cached)) => {
                tracing::debug!(key = %key, "Cache hit");
                Ok(cached)
            }
            miss => {
                if let Err(e) = miss {
                    tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                }
                match $block.await {
                    Ok(value) => {
                        $cache.set_in_background(&key, &value, $ttl);
                        Ok(value)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }};
}
