//! Qualified-segment resolution: cache in front of the remote fetcher.
mod cache;
mod fetcher;

use std::sync::Arc;

pub use cache::{LruCache, SegmentCache};
pub use fetcher::{GraphqlSegmentsFetcher, QualifiedSegmentsFetcher};

use crate::Result;

/// Per-call options for `fetch_qualified_segments`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOption {
    /// Bypass the cache for both lookup and save.
    IgnoreCache,
    /// Clear the whole cache before resolving.
    ResetCache,
}

/// Combines the segment cache with the remote fetcher.
pub struct SegmentManager {
    cache: Box<dyn SegmentCache>,
    fetcher: Arc<dyn QualifiedSegmentsFetcher>,
}

impl SegmentManager {
    pub fn new(
        cache: Box<dyn SegmentCache>,
        fetcher: Arc<dyn QualifiedSegmentsFetcher>,
    ) -> SegmentManager {
        SegmentManager { cache, fetcher }
    }

    /// The segments from `segments_to_check` the user qualifies for, served
    /// from cache when possible.
    pub async fn fetch_qualified_segments(
        &self,
        api_key: &str,
        api_host: &str,
        user_id: &str,
        segments_to_check: &[String],
        options: &[SegmentOption],
    ) -> Result<Vec<String>> {
        if options.contains(&SegmentOption::ResetCache) {
            self.cache.reset();
        }

        let ignore_cache = options.contains(&SegmentOption::IgnoreCache);
        let key = cache_key(user_id);
        if !ignore_cache {
            if let Some(cached) = self.cache.lookup(&key) {
                log::debug!(target: "flagship",
                            user_id;
                            "serving qualified segments from cache");
                return Ok(cached);
            }
        }

        let segments = self
            .fetcher
            .fetch(api_key, api_host, user_id, segments_to_check)
            .await?;
        if !ignore_cache {
            self.cache.save(key, segments.clone());
        }
        Ok(segments)
    }

    /// Drop the cached entry for one user.
    pub fn invalidate(&self, user_id: &str) {
        self.cache.remove(&cache_key(user_id));
    }

    pub fn reset_cache(&self) {
        self.cache.reset();
    }
}

fn cache_key(user_id: &str) -> String {
    format!("fs_user_id-$-{user_id}")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::Error;

    struct StubFetcher {
        result: Mutex<Result<Vec<String>>>,
        calls: Mutex<u32>,
    }

    impl StubFetcher {
        fn returning(segments: &[&str]) -> Arc<StubFetcher> {
            Arc::new(StubFetcher {
                result: Mutex::new(Ok(segments.iter().map(|s| s.to_string()).collect())),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl QualifiedSegmentsFetcher for Arc<StubFetcher> {
        async fn fetch(
            &self,
            _api_key: &str,
            _api_host: &str,
            _user_id: &str,
            _segments_to_check: &[String],
        ) -> Result<Vec<String>> {
            *self.calls.lock().unwrap() += 1;
            self.result.lock().unwrap().clone()
        }
    }

    fn manager(fetcher: Arc<StubFetcher>) -> SegmentManager {
        SegmentManager::new(
            Box::new(LruCache::default()),
            Arc::new(fetcher) as Arc<dyn QualifiedSegmentsFetcher>,
        )
    }

    async fn fetch(
        manager: &SegmentManager,
        user_id: &str,
        options: &[SegmentOption],
    ) -> Result<Vec<String>> {
        manager
            .fetch_qualified_segments("key", "https://odp.example.com", user_id, &["s1".to_owned()], options)
            .await
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let fetcher = StubFetcher::returning(&["a"]);
        let manager = manager(Arc::clone(&fetcher));

        assert_eq!(fetch(&manager, "userA", &[]).await.unwrap(), ["a"]);
        assert_eq!(fetch(&manager, "userA", &[]).await.unwrap(), ["a"]);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn ignore_cache_bypasses_lookup_and_save() {
        let fetcher = StubFetcher::returning(&["a"]);
        let manager = manager(Arc::clone(&fetcher));

        // Seed the cache with ["a"], then change what the remote returns.
        fetch(&manager, "userA", &[]).await.unwrap();
        *fetcher.result.lock().unwrap() = Ok(vec!["b".to_owned()]);

        let fresh = fetch(&manager, "userA", &[SegmentOption::IgnoreCache])
            .await
            .unwrap();
        assert_eq!(fresh, ["b"]);

        // The cached value was neither used nor replaced.
        assert_eq!(fetch(&manager, "userA", &[]).await.unwrap(), ["a"]);
    }

    #[tokio::test]
    async fn reset_cache_clears_before_resolving() {
        let fetcher = StubFetcher::returning(&["a"]);
        let manager = manager(Arc::clone(&fetcher));

        fetch(&manager, "userA", &[]).await.unwrap();
        *fetcher.result.lock().unwrap() = Ok(vec!["b".to_owned()]);

        let fresh = fetch(&manager, "userA", &[SegmentOption::ResetCache])
            .await
            .unwrap();
        assert_eq!(fresh, ["b"]);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn fetch_errors_do_not_poison_the_cache() {
        let fetcher = StubFetcher::returning(&["a"]);
        let manager = manager(Arc::clone(&fetcher));

        fetch(&manager, "userA", &[]).await.unwrap();
        *fetcher.result.lock().unwrap() =
            Err(Error::FetchSegmentsFailed("offline".to_owned()));

        let result = fetch(&manager, "userA", &[SegmentOption::IgnoreCache]).await;
        assert!(matches!(result, Err(Error::FetchSegmentsFailed(_))));

        // The earlier cached result still serves.
        assert_eq!(fetch(&manager, "userA", &[]).await.unwrap(), ["a"]);
    }
}
