//! In-process single-flight request cache.
//!
//! A [`Deduplicator`] guarantees that at most one computation is in flight per key, and
//! that a successful result is reused until its time-to-live elapses. Failures are never
//! cached: every caller awaiting the failed computation receives the same
//! [`FetchError`], and the entry is dropped so the next call starts from scratch.
//! Expired entries of every key are evicted whenever any key misses.
//!
//! Per key state machine:
//! `Empty -> Pending -> Ready(expires_at) -> Empty (expiry or invalidation) -> Pending`.

use crate::error::FetchError;
use fnv::FnvHashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::{
    any::{Any, TypeId},
    future::Future,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, warn};

pub mod keys;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, FetchError>>>;

/// Keyed single-flight cache with time based result reuse.
///
/// Cloning is cheap and every clone shares the same table.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    inner: Arc<Inner>,
}

struct Inner {
    ttl: Duration,
    next_generation: AtomicU64,
    entries: Mutex<FnvHashMap<CacheKey, CacheEntry>>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

/// Entries are keyed by name and value type, so one table can hold results of
/// different types without clashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    name: SmolStr,
    type_id: TypeId,
}

impl CacheKey {
    fn of<T: 'static>(name: &str) -> Self {
        Self {
            name: SmolStr::new(name),
            type_id: TypeId::of::<T>(),
        }
    }
}

struct CacheEntry {
    /// `None` while the computation is still in flight.
    expires_at: Option<Instant>,
    /// Identifies the computation that created this entry.
    generation: u64,
    /// Always a `Slot<T>` where `T` matches `CacheKey::type_id`.
    slot: Box<dyn Any + Send + Sync>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

enum Slot<T> {
    Pending(SharedFetch<T>),
    Ready(T),
}

enum Lookup<T> {
    Hit(T),
    Join(SharedFetch<T>),
    Start(SharedFetch<T>),
}

impl Deduplicator {
    /// Create a cache whose fulfilled entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                ttl,
                next_generation: AtomicU64::new(0),
                entries: Mutex::new(FnvHashMap::default()),
            }),
        }
    }

    /// Time-to-live applied to fulfilled entries.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Return the cached result for `key`, join the computation already in flight for
    /// `key`, or run `producer` and cache its outcome.
    ///
    /// `producer` is invoked at most once per pending computation, no matter how many
    /// callers are waiting on it.
    pub async fn deduplicate<T, F, Fut>(&self, key: &str, producer: F) -> Result<T, FetchError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let future = match self.lookup_or_start(&CacheKey::of::<T>(key), producer) {
            Lookup::Hit(value) => {
                debug!(key, "cache hit");
                return Ok(value);
            }
            Lookup::Join(future) => {
                debug!(key, "joining in-flight request");
                future
            }
            Lookup::Start(future) => {
                debug!(key, "cache miss, starting request");
                future
            }
        };

        future.await
    }

    /// Check-and-set under a single lock acquisition, so two callers can never both
    /// decide to start a producer for the same key.
    fn lookup_or_start<T, F, Fut>(&self, cache_key: &CacheKey, producer: F) -> Lookup<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();

        if let Some(entry) = entries.get(cache_key) {
            match entry.slot.downcast_ref::<Slot<T>>() {
                Some(Slot::Ready(value)) if !entry.is_expired(now) => {
                    return Lookup::Hit(value.clone());
                }
                Some(Slot::Pending(future)) => return Lookup::Join(future.clone()),
                _ => {}
            }
        }

        // Sweep expired entries of every key on a miss.
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "evicted expired cache entries");
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(&self.inner);
        let settle_key = cache_key.clone();

        // The producer only runs once the shared future is first polled, outside the lock.
        let future = async move {
            let result = producer().await;
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.settle(&settle_key, generation, &result);
            }
            result
        }
        .boxed()
        .shared();

        entries.insert(
            cache_key.clone(),
            CacheEntry {
                expires_at: None,
                generation,
                slot: Box::new(Slot::Pending(future.clone())),
            },
        );

        Lookup::Start(future)
    }

    /// Remove every entry named `key`, whatever its state.
    ///
    /// Callers already awaiting a pending computation still receive its result, but the
    /// result is not stored.
    pub fn invalidate(&self, key: &str) {
        self.inner
            .entries
            .lock()
            .retain(|cache_key, _| cache_key.name != key);
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.inner.entries.lock().clear();
    }

    /// Drop fulfilled entries whose time-to-live has elapsed, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of entries, pending or fulfilled, currently held.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    /// Store or drop the outcome of computation `generation`, unless its entry has since
    /// been invalidated or replaced.
    fn settle<T>(&self, cache_key: &CacheKey, generation: u64, result: &Result<T, FetchError>)
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut entries = self.entries.lock();

        let is_current = entries
            .get(cache_key)
            .is_some_and(|entry| entry.generation == generation && entry.expires_at.is_none());
        if !is_current {
            return;
        }

        match result {
            Ok(value) => {
                entries.insert(
                    cache_key.clone(),
                    CacheEntry {
                        expires_at: Some(Instant::now() + self.ttl),
                        generation,
                        slot: Box::new(Slot::Ready(value.clone())),
                    },
                );
            }
            Err(error) => {
                entries.remove(cache_key);
                warn!(key = %cache_key.name, %error, "request failed, cache entry cleared");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::AtomicUsize;

    const TTL: Duration = Duration::from_secs(30);

    fn counting_producer(
        calls: &Arc<AtomicUsize>,
        value: u64,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u64, FetchError>> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    fn failing_producer(
        calls: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u64, FetchError>> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(FetchError::api(500, Some("upstream down".to_string())))
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_value_reused_within_ttl() {
        let cache = Deduplicator::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.deduplicate("markPrices", counting_producer(&calls, 7)).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        let second = cache.deduplicate("markPrices", counting_producer(&calls, 8)).await;

        assert_eq!(first, Ok(7));
        assert_eq!(second, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_computation() {
        let cache = Deduplicator::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let results = join_all(
            (0..8).map(|value| cache.deduplicate("symbols", counting_producer(&calls, value))),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|result| *result == Ok(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_failure_and_retry() {
        let cache = Deduplicator::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let results = join_all(
            (0..4).map(|_| cache.deduplicate("accountDetails_1", failing_producer(&calls))),
        )
        .await;

        let expected = Err(FetchError::api(500, Some("upstream down".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|result| *result == expected));
        assert!(cache.is_empty());

        // No negative caching: the next call runs the producer again
        let retry = cache
            .deduplicate("accountDetails_1", counting_producer(&calls, 11))
            .await;
        assert_eq!(retry, Ok(11));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched_and_overwritten() {
        let cache = Deduplicator::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.deduplicate("k", counting_producer(&calls, 1)).await, Ok(1));

        tokio::time::advance(TTL + Duration::from_millis(1)).await;

        assert_eq!(cache.deduplicate("k", counting_producer(&calls, 2)).await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refetch() {
        let cache = Deduplicator::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.deduplicate("k", counting_producer(&calls, 1)).await, Ok(1));
        cache.invalidate("k");
        assert!(cache.is_empty());
        assert_eq!(cache.deduplicate("k", counting_producer(&calls, 2)).await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_while_pending_discards_result() {
        let cache = Deduplicator::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let pending = cache.deduplicate("k", counting_producer(&calls, 1));
        let invalidate = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.invalidate("k");
        };
        let (result, ()) = tokio::join!(pending, invalidate);

        assert_eq!(result, Ok(1));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = Deduplicator::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        cache.deduplicate("a", counting_producer(&calls, 1)).await.unwrap();
        cache.deduplicate("b", counting_producer(&calls, 2)).await.unwrap();
        assert_eq!(cache.purge_expired(), 0);

        tokio::time::advance(TTL).await;

        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_evicts_stale_entries_of_other_keys() {
        let cache = Deduplicator::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        for user in 0..100 {
            let key = format!("accountDetails_{user}");
            cache.deduplicate(&key, counting_producer(&calls, user)).await.unwrap();
        }
        assert_eq!(cache.len(), 100);

        tokio::time::advance(Duration::from_secs(3600)).await;

        let actual = cache.deduplicate("markPrices", counting_producer(&calls, 1)).await;
        assert_eq!(actual, Ok(1));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_keeps_live_and_pending_entries() {
        let cache = Deduplicator::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        cache.deduplicate("stale", counting_producer(&calls, 1)).await.unwrap();
        tokio::time::advance(TTL).await;
        cache.deduplicate("live", counting_producer(&calls, 2)).await.unwrap();

        let pending = cache.deduplicate("pending", counting_producer(&calls, 3));
        let miss = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            // "pending" is in flight while this miss sweeps the table
            let result = cache.deduplicate("other", counting_producer(&calls, 4)).await;
            (result, cache.len())
        };
        let (pending, (other, len_during_sweep)) = tokio::join!(pending, miss);

        assert_eq!(pending, Ok(3));
        assert_eq!(other, Ok(4));
        // live + pending + other, stale evicted
        assert_eq!(len_during_sweep, 3);
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_name_different_types_do_not_clash() {
        let cache = Deduplicator::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let number = cache.deduplicate("k", counting_producer(&calls, 3)).await;
        let text = cache
            .deduplicate("k", || async { Ok::<_, FetchError>("three".to_string()) })
            .await;

        assert_eq!(number, Ok(3));
        assert_eq!(text, Ok("three".to_string()));
        assert_eq!(cache.len(), 2);

        cache.invalidate("k");
        assert!(cache.is_empty());
    }
}
