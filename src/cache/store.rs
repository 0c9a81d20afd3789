//! Process-wide content cache.
//!
//! One [`ContentCache`] is built at start-up and shared by handle. Entries
//! carry their own expiry and are purged lazily on read; there is no
//! background sweep. Population of a cold key is coalesced per key so a burst
//! of readers triggers a single fetch.

use std::any::Any;
use std::convert::Infallible;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;
use metrics::counter;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::config::CacheConfig;
use super::keys::ContentKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

#[derive(Clone)]
struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

pub struct ContentCache {
    entries: RwLock<LruCache<String, CacheEntry>>,
    inflight: DashMap<String, Arc<AsyncMutex<()>>>,
    // Bumped on every invalidation; a population that straddles a bump is
    // returned to its caller but not stored.
    epoch: AtomicU64,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl ContentCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.max_entries_non_zero())),
            inflight: DashMap::new(),
            epoch: AtomicU64::new(0),
            clock,
            default_ttl: config.default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fresh value for `key`, or `None`.
    ///
    /// An expired entry is removed as a side effect. A value stored under a
    /// different type than `T` reads as absent.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.lookup(key, true)
    }

    /// Like [`get`](Self::get) but only expiry is counted; used for the
    /// re-check after waiting on a population gate.
    fn peek<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.lookup(key, false)
    }

    fn lookup<T>(&self, key: &str, record: bool) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = self.clock.now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");

        let expired = match entries.get(key) {
            None => {
                if record {
                    counter!("gitfolio_cache_miss_total").increment(1);
                }
                return None;
            }
            Some(entry) if now > entry.expires_at => true,
            Some(entry) => {
                return match entry.value.downcast_ref::<T>() {
                    Some(value) => {
                        if record {
                            counter!("gitfolio_cache_hit_total").increment(1);
                        }
                        Some(value.clone())
                    }
                    None => {
                        warn!(
                            target = "gitfolio::cache",
                            key,
                            expected = std::any::type_name::<T>(),
                            "cached value has unexpected type; treating as miss"
                        );
                        if record {
                            counter!("gitfolio_cache_miss_total").increment(1);
                        }
                        None
                    }
                };
            }
        };

        if expired {
            entries.pop(key);
            counter!("gitfolio_cache_expired_total").increment(1);
            debug!(target = "gitfolio::cache", key, "expired entry purged");
        }
        None
    }

    pub fn set<T>(&self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Store `value` until `now + ttl`, replacing any existing entry.
    pub fn set_with_ttl<T>(&self, key: impl Into<String>, value: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        let key = key.into();
        let entry = self.entry(value, ttl);
        let mut entries = rw_write(&self.entries, SOURCE, "set");
        Self::insert(&mut entries, key, entry);
    }

    /// Store `value` only if no invalidation happened since `epoch` was read.
    /// The comparison and the insert share the entries lock with
    /// invalidation, so a stale value can never land after an invalidation
    /// completes. Returns whether the value was stored.
    fn set_if_epoch<T>(&self, key: &str, value: T, ttl: Duration, epoch: u64) -> bool
    where
        T: Send + Sync + 'static,
    {
        let entry = self.entry(value, ttl);
        let mut entries = rw_write(&self.entries, SOURCE, "set_if_epoch");
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        Self::insert(&mut entries, key.to_string(), entry);
        true
    }

    fn entry<T>(&self, value: T, ttl: Duration) -> CacheEntry
    where
        T: Send + Sync + 'static,
    {
        CacheEntry {
            value: Arc::new(value),
            expires_at: self.clock.now() + ttl,
        }
    }

    fn insert(entries: &mut LruCache<String, CacheEntry>, key: String, entry: CacheEntry) {
        let evicted = entries.push(key.clone(), entry);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            debug!(
                target = "gitfolio::cache",
                key = %evicted_key,
                "entry evicted for capacity"
            );
        }
    }

    /// Remove `key`; absent keys are ignored.
    pub fn invalidate(&self, key: &str) {
        let mut entries = rw_write(&self.entries, SOURCE, "invalidate");
        self.epoch.fetch_add(1, Ordering::SeqCst);
        entries.pop(key);
    }

    pub fn invalidate_keys(&self, keys: &[ContentKey]) {
        let mut entries = rw_write(&self.entries, SOURCE, "invalidate_keys");
        self.epoch.fetch_add(1, Ordering::SeqCst);
        for key in keys {
            entries.pop(key.as_cache_key().as_str());
        }
        drop(entries);
        debug!(
            target = "gitfolio::cache",
            keys = ?keys.iter().map(ContentKey::as_cache_key).collect::<Vec<_>>(),
            "content keys invalidated"
        );
    }

    /// Drop the fixed set of externally-sourced content keys, leaving every
    /// other entry alone.
    pub fn invalidate_content(&self) {
        self.invalidate_keys(&ContentKey::CONTENT);
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn get_or_set<T, F, Fut>(&self, key: &str, producer: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.get_or_set_with_ttl(key, self.default_ttl, producer)
            .await
    }

    pub async fn get_or_set_with_ttl<T, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let result = self
            .try_get_or_set_with_ttl(key, ttl, move || async move {
                Ok::<T, Infallible>(producer().await)
            })
            .await;
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    pub async fn try_get_or_set<T, E, F, Fut>(&self, key: &str, producer: F) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_get_or_set_with_ttl(key, self.default_ttl, producer)
            .await
    }

    /// Return the fresh value for `key`, or run `producer`, store its `Ok`
    /// result and return it. Errors are passed through and never stored.
    pub async fn try_get_or_set_with_ttl<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        producer: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key) {
            return Ok(hit);
        }

        let gate = Arc::clone(
            self.inflight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .value(),
        );

        let result = {
            let _populating = gate.lock().await;
            match self.peek::<T>(key) {
                Some(hit) => Ok(hit),
                None => {
                    let epoch = self.epoch.load(Ordering::SeqCst);
                    let produced = producer().await;
                    if let Ok(value) = produced.as_ref()
                        && !self.set_if_epoch(key, value.clone(), ttl, epoch)
                    {
                        debug!(
                            target = "gitfolio::cache",
                            key,
                            "invalidated during population; result not stored"
                        );
                    }
                    produced
                }
            }
        };

        drop(gate);
        self.inflight
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }
}
