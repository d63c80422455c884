//! Generic expiring key/value store shared by the Client Pool for
//! connection-status, capability sets, and other small scratch entries.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;

#[derive(Clone)]
struct Entry<V> {
    value: V,
    ttl: Duration,
    cost: u32,
}

struct PerEntryTtl;

impl<K, V> Expiry<K, Entry<V>> for PerEntryTtl {
    fn expire_after_create(&self, _key: &K, value: &Entry<V>, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Thread-safe TTL cache with optional per-entry cost, backed by `moka`.
///
/// `K`/`V` must be `Clone + Send + Sync + 'static` as required by
/// `moka::future::Cache`. Expiry is per-entry (each `set_with_ttl` call
/// supplies its own TTL) via `moka`'s `Expiry` trait; `cost` bounds the
/// cache's total weighted size alongside its entry-count capacity.
pub struct SmallObjectCache<K, V>
where
    K: Hash + Eq + Send + Sync + Clone + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Cache<K, Entry<V>>,
}

impl<K, V> SmallObjectCache<K, V>
where
    K: Hash + Eq + Send + Sync + Clone + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Build a cache bounded to `max_capacity` total cost units.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .weigher(|_key, entry: &Entry<V>| entry.cost.max(1))
                .expire_after(PerEntryTtl)
                .build(),
        }
    }

    /// Fetch `key`, returning `None` if absent or expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).await.map(|entry| entry.value)
    }

    /// Insert `value` under `key` with weight `cost` and expiry `ttl`.
    pub async fn set_with_ttl(&self, key: K, value: V, cost: u32, ttl: Duration) {
        self.inner.insert(key, Entry { value, ttl, cost }).await;
    }

    /// Remove `key`, if present.
    pub async fn delete(&self, key: &K) {
        self.inner.invalidate(key).await;
    }

    /// Current entry count (best-effort; moka's housekeeping runs async).
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl<K, V> Clone for SmallObjectCache<K, V>
where
    K: Hash + Eq + Send + Sync + Clone + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

/// Shared handle form used by the Client Pool (`Arc<SmallObjectCache<_, _>>`
/// reads more plainly at call sites than repeating the generic bound).
pub type SharedCache<K, V> = Arc<SmallObjectCache<K, V>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache: SmallObjectCache<String, u32> = SmallObjectCache::new(1_024);
        cache.set_with_ttl("a".into(), 42, 1, Duration::from_secs(30)).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(42));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache: SmallObjectCache<&str, u32> = SmallObjectCache::new(1_024);
        cache.set_with_ttl("a", 1, 1, Duration::from_secs(30)).await;
        cache.delete(&"a").await;
        assert_eq!(cache.get(&"a").await, None);
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let cache: SmallObjectCache<&str, u32> = SmallObjectCache::new(1_024);
        assert_eq!(cache.get(&"missing").await, None);
    }
}
