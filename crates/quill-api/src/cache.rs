//! Post listing cache
//!
//! Best effort: a miss or a key that cannot be built falls through to the
//! store, and every post write invalidates all cached listings. Uses moka
//! for a concurrent TTL cache.
//!
//! A generation counter guards against a slow reader caching a listing it
//! read before a write: readers capture [`PostListCache::generation`] before
//! going to the store and the result is only kept while it is unchanged.

use moka::future::Cache;
use quill_core::{CacheConfig, Post, PostQuery};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cached post listings keyed by the serialized, normalized query
#[derive(Clone)]
pub struct PostListCache {
    cache: Option<Cache<String, Arc<Vec<Post>>>>,
    /// Bumped before every invalidation
    generation: Arc<AtomicU64>,
    stats: Arc<CacheStats>,
}

impl PostListCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = config.enabled.then(|| {
            Cache::builder()
                .max_capacity(config.max_capacity)
                .time_to_live(Duration::from_secs(config.ttl_secs))
                .build()
        });

        Self {
            cache,
            generation: Arc::new(AtomicU64::new(0)),
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Cache key for a normalized query
    pub fn key_for(query: &PostQuery) -> Option<String> {
        serde_json::to_string(query)
            .ok()
            .map(|json| format!("posts:{json}"))
    }

    pub async fn get(&self, query: &PostQuery) -> Option<Arc<Vec<Post>>> {
        let cache = self.cache.as_ref()?;
        let key = Self::key_for(query)?;

        let result = cache.get(&key).await;
        if result.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Current invalidation generation; capture it before reading the store
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store a listing read at `generation`, unless a write happened since.
    ///
    /// Returns whether the listing was kept.
    pub async fn put_if_current(
        &self,
        query: &PostQuery,
        posts: Arc<Vec<Post>>,
        generation: u64,
    ) -> bool {
        let (Some(cache), Some(key)) = (self.cache.as_ref(), Self::key_for(query)) else {
            return false;
        };
        if self.generation() != generation {
            return false;
        }
        cache.insert(key.clone(), posts).await;

        // An invalidation that raced the insert may have run before it landed
        if self.generation() != generation {
            cache.invalidate(&key).await;
            return false;
        }
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Drop every cached listing
    pub async fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
            cache.run_pending_tasks().await;
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.as_ref().map(|c| c.entry_count()).unwrap_or(0)
    }

    pub fn report(&self) -> CacheStatsReport {
        self.stats.report(self.cache.is_some())
    }
}

#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheStats {
    fn report(&self, enabled: bool) -> CacheStatsReport {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStatsReport {
            enabled,
            hits,
            misses,
            writes: self.writes.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsReport {
    pub enabled: bool,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub invalidations: u64,
    /// 0.0 - 1.0
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::NewPost;
    use uuid::Uuid;

    fn sample() -> Arc<Vec<Post>> {
        Arc::new(vec![Post::from_new(NewPost {
            title: "Hello".into(),
            content: "World".into(),
            tags: vec![],
            author_id: Uuid::new_v4(),
        })])
    }

    #[tokio::test]
    async fn test_hit_miss_and_invalidate() {
        let cache = PostListCache::new(&CacheConfig::default());
        let query = PostQuery::default().normalized();

        assert!(cache.get(&query).await.is_none());
        assert!(cache.put_if_current(&query, sample(), cache.generation()).await);
        assert_eq!(cache.get(&query).await.unwrap().len(), 1);

        cache.invalidate_all().await;
        assert!(cache.get(&query).await.is_none());

        let report = cache.report();
        assert_eq!(report.hits, 1);
        assert_eq!(report.misses, 2);
        assert_eq!(report.writes, 1);
        assert_eq!(report.invalidations, 1);
    }

    #[tokio::test]
    async fn test_distinct_queries_distinct_keys() {
        let cache = PostListCache::new(&CacheConfig::default());
        let first = PostQuery::default().normalized();
        let second = PostQuery {
            offset: 20,
            ..Default::default()
        }
        .normalized();

        cache.put_if_current(&first, sample(), cache.generation()).await;
        assert!(cache.get(&second).await.is_none());
        assert_ne!(
            PostListCache::key_for(&first),
            PostListCache::key_for(&second)
        );
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let cache = PostListCache::new(&CacheConfig {
            enabled: false,
            ..Default::default()
        });
        let query = PostQuery::default().normalized();
        assert!(!cache.put_if_current(&query, sample(), cache.generation()).await);
        assert!(cache.get(&query).await.is_none());
        assert!(!cache.report().enabled);
    }

    #[tokio::test]
    async fn test_listing_read_before_a_write_is_not_cached() {
        let cache = PostListCache::new(&CacheConfig::default());
        let query = PostQuery::default().normalized();

        // Reader starts, a write lands and invalidates, then the reader finishes
        let seen = cache.generation();
        cache.invalidate_all().await;
        assert!(!cache.put_if_current(&query, sample(), seen).await);
        assert!(cache.get(&query).await.is_none());
        assert_eq!(cache.report().writes, 0);

        // A reader that started after the write caches normally
        let fresh = cache.generation();
        assert!(cache.put_if_current(&query, sample(), fresh).await);
        assert!(cache.get(&query).await.is_some());
    }

    #[tokio::test]
    async fn test_clones_share_generation() {
        let cache = PostListCache::new(&CacheConfig::default());
        let other = cache.clone();
        let seen = cache.generation();

        other.invalidate_all().await;
        assert_ne!(cache.generation(), seen);
    }
}
