//! Dataset Cache
//!
//! Keeps the raw bypass dataset in the key/value store together with the time
//! it was fetched, and only goes back to the network once the entry is older
//! than the configured TTL (24 hours by default).

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::storage::KeyValueStore;

// =============================================================================
// Capabilities
// =============================================================================

/// Wall clock in milliseconds since the Unix epoch.
pub trait Clock {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Remote location of the dataset.
#[async_trait(?Send)]
pub trait DatasetSource {
    /// Fetch the raw TSV text. Non-success responses are errors.
    async fn fetch_dataset(&self) -> Result<String>;
}

// =============================================================================
// Cache Entry
// =============================================================================

/// Cached dataset payload and its fetch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetCacheEntry {
    pub raw_text: String,
    /// Milliseconds since the Unix epoch
    pub fetched_at: u64,
}

impl DatasetCacheEntry {
    /// An entry is fresh when it has a payload and is younger than `ttl`.
    /// A fetch time in the future counts as age zero.
    pub fn is_fresh(&self, now: u64, ttl: Duration) -> bool {
        !self.raw_text.is_empty() && within_ttl(self.fetched_at, now, ttl)
    }

    pub fn age(&self, now: u64) -> Duration {
        Duration::from_millis(now.saturating_sub(self.fetched_at))
    }
}

/// Is a timestamp younger than `ttl` at `now`?
#[inline]
pub fn within_ttl(fetched_at: u64, now: u64, ttl: Duration) -> bool {
    now.saturating_sub(fetched_at) < ttl.as_millis() as u64
}

// =============================================================================
// Dataset Cache
// =============================================================================

pub struct DatasetCache<S, D, C> {
    store: S,
    source: D,
    clock: C,
    config: CacheConfig,
}

impl<S, D, C> DatasetCache<S, D, C>
where
    S: KeyValueStore,
    D: DatasetSource,
    C: Clock,
{
    pub fn new(store: S, source: D, clock: C, config: CacheConfig) -> Self {
        Self {
            store,
            source,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Read the cached entry without touching the network.
    /// Returns `None` unless both the payload and the timestamp are stored.
    pub async fn load(&self) -> Result<Option<DatasetCacheEntry>> {
        let keys = [self.config.payload_key.as_str(), self.config.timestamp_key.as_str()];
        let stored = self.store.get(&keys).await?;

        let raw_text = stored.get(&self.config.payload_key).and_then(Value::as_str);
        let fetched_at = stored.get(&self.config.timestamp_key).and_then(Value::as_u64);

        Ok(match (raw_text, fetched_at) {
            (Some(raw_text), Some(fetched_at)) => Some(DatasetCacheEntry {
                raw_text: raw_text.to_string(),
                fetched_at,
            }),
            _ => None,
        })
    }

    /// Return the dataset, fetching it first if the cached copy is missing
    /// or stale.
    ///
    /// Failures are logged and yield `None`; the previous entry is left as it
    /// was. An empty dataset is `Some("")`.
    pub async fn ensure_fresh(&self) -> Option<String> {
        match self.try_ensure_fresh().await {
            Ok(text) => Some(text),
            Err(e) => {
                log::error!("Error fetching and storing CSP data: {}", e);
                None
            }
        }
    }

    async fn try_ensure_fresh(&self) -> Result<String> {
        let now = self.clock.now_millis();
        let previous = self.load().await?;

        if let Some(entry) = previous {
            if entry.is_fresh(now, self.config.ttl()) {
                log::info!("Using cached CSP data ({}s old)", entry.age(now).as_secs());
                return Ok(entry.raw_text);
            }
            return self.fetch_and_store(now, Some(entry.fetched_at)).await;
        }

        self.fetch_and_store(now, None).await
    }

    /// Fetch regardless of freshness.
    pub async fn refresh(&self) -> Result<String> {
        let now = self.clock.now_millis();
        let previous = match self.load().await {
            Ok(entry) => entry.map(|e| e.fetched_at),
            Err(e) => {
                log::warn!("Could not read cached CSP data before refresh: {}", e);
                None
            }
        };
        self.fetch_and_store(now, previous).await
    }

    async fn fetch_and_store(&self, now: u64, previous_fetched_at: Option<u64>) -> Result<String> {
        let text = self.source.fetch_dataset().await?;

        // Never move the timestamp backwards, even if the clock did
        let fetched_at = previous_fetched_at.map_or(now, |prev| prev.max(now));

        self.store
            .set(HashMap::from([
                (self.config.payload_key.clone(), Value::String(text.clone())),
                (self.config.timestamp_key.clone(), Value::from(fetched_at)),
            ]))
            .await?;

        log::info!("CSP data fetched and stored successfully ({} bytes)", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;
    use crate::error::Error;
    use crate::storage::MemoryStore;

    const HOUR: u64 = 60 * 60 * 1000;
    const NOW: u64 = 1_700_000_000_000;

    struct FixedClock(Cell<u64>);

    impl Clock for FixedClock {
        fn now_millis(&self) -> u64 {
            self.0.get()
        }
    }

    struct FakeSource {
        calls: Cell<usize>,
        response: Result<String>,
    }

    impl FakeSource {
        fn ok(text: &str) -> Self {
            Self {
                calls: Cell::new(0),
                response: Ok(text.to_string()),
            }
        }

        fn failing() -> Self {
            Self {
                calls: Cell::new(0),
                response: Err(Error::network("404 Not Found")),
            }
        }
    }

    #[async_trait(?Send)]
    impl DatasetSource for FakeSource {
        async fn fetch_dataset(&self) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(Error::network(e.to_string())),
            }
        }
    }

    async fn cache_with(
        payload: Option<&str>,
        fetched_at: Option<u64>,
        source: FakeSource,
    ) -> DatasetCache<Rc<MemoryStore>, FakeSource, FixedClock> {
        let store = Rc::new(MemoryStore::new());
        let mut items = HashMap::new();
        if let Some(payload) = payload {
            items.insert("cspData".to_string(), json!(payload));
        }
        if let Some(fetched_at) = fetched_at {
            items.insert("lastFetchTimestamp".to_string(), json!(fetched_at));
        }
        store.set(items).await.unwrap();
        DatasetCache::new(store, source, FixedClock(Cell::new(NOW)), CacheConfig::default())
    }

    #[test]
    fn test_is_fresh_window() {
        let entry = DatasetCacheEntry {
            raw_text: "h\nx\ty".to_string(),
            fetched_at: NOW - 23 * HOUR,
        };
        let ttl = Duration::from_secs(24 * 3600);
        assert!(entry.is_fresh(NOW, ttl));
        assert!(!entry.is_fresh(NOW + 2 * HOUR, ttl));
        // Clock behind the stored timestamp
        assert!(entry.is_fresh(NOW - 30 * HOUR, ttl));
    }

    #[tokio::test]
    async fn test_fresh_entry_makes_no_network_call() {
        let cache = cache_with(Some("cached"), Some(NOW - 23 * HOUR), FakeSource::ok("remote")).await;
        assert_eq!(cache.ensure_fresh().await.as_deref(), Some("cached"));
        assert_eq!(cache.source().calls.get(), 0);
    }

    #[tokio::test]
    async fn test_stale_entry_fetches_once() {
        let cache = cache_with(Some("cached"), Some(NOW - 25 * HOUR), FakeSource::ok("remote")).await;
        assert_eq!(cache.ensure_fresh().await.as_deref(), Some("remote"));
        assert_eq!(cache.source().calls.get(), 1);

        let entry = cache.load().await.unwrap().unwrap();
        assert_eq!(entry, DatasetCacheEntry { raw_text: "remote".to_string(), fetched_at: NOW });

        // Second call within the window is served from the cache
        assert_eq!(cache.ensure_fresh().await.as_deref(), Some("remote"));
        assert_eq!(cache.source().calls.get(), 1);
    }

    #[tokio::test]
    async fn test_missing_entry_fetches() {
        let cache = cache_with(None, None, FakeSource::ok("remote")).await;
        assert_eq!(cache.ensure_fresh().await.as_deref(), Some("remote"));
        assert_eq!(cache.source().calls.get(), 1);
    }

    #[tokio::test]
    async fn test_empty_or_partial_entry_is_stale() {
        let cache = cache_with(Some(""), Some(NOW), FakeSource::ok("remote")).await;
        assert_eq!(cache.ensure_fresh().await.as_deref(), Some("remote"));
        assert_eq!(cache.source().calls.get(), 1);

        let cache = cache_with(Some("cached"), None, FakeSource::ok("remote")).await;
        assert_eq!(cache.ensure_fresh().await.as_deref(), Some("remote"));
        assert_eq!(cache.source().calls.get(), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_entry() {
        let cache = cache_with(Some("cached"), Some(NOW - 25 * HOUR), FakeSource::failing()).await;
        assert_eq!(cache.ensure_fresh().await, None);
        assert_eq!(cache.source().calls.get(), 1);

        let entry = cache.load().await.unwrap().unwrap();
        assert_eq!(entry.raw_text, "cached");
        assert_eq!(entry.fetched_at, NOW - 25 * HOUR);
    }

    #[tokio::test]
    async fn test_failure_without_entry_is_no_data() {
        let cache = cache_with(None, None, FakeSource::failing()).await;
        assert_eq!(cache.ensure_fresh().await, None);
        assert!(cache.store().is_empty());
    }

    #[tokio::test]
    async fn test_empty_dataset_is_distinct_from_no_data() {
        let cache = cache_with(None, None, FakeSource::ok("")).await;
        assert_eq!(cache.ensure_fresh().await, Some(String::new()));
    }

    #[tokio::test]
    async fn test_refresh_forces_fetch() {
        let cache = cache_with(Some("cached"), Some(NOW - HOUR), FakeSource::ok("remote")).await;
        assert_eq!(cache.refresh().await.unwrap(), "remote");
        assert_eq!(cache.source().calls.get(), 1);
    }

    #[tokio::test]
    async fn test_timestamp_never_decreases() {
        let future = NOW + 5 * HOUR;
        let cache = cache_with(Some("cached"), Some(future), FakeSource::ok("remote")).await;
        cache.refresh().await.unwrap();
        assert_eq!(cache.load().await.unwrap().unwrap().fetched_at, future);

        cache.clock().0.set(future + 30 * HOUR);
        assert_eq!(cache.ensure_fresh().await.as_deref(), Some("remote"));
        assert_eq!(cache.load().await.unwrap().unwrap().fetched_at, future + 30 * HOUR);
    }
}
