use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned, de::IgnoredAny};
use tokio::{
    sync::{
        Mutex as AsyncMutex,
        mpsc::{self, error::TrySendError},
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{CacheEntry, CacheMetrics, CacheStore, MetricsSnapshot};
use crate::{
    config::{CacheConfig, RefreshConfig},
    errors::ProviderError,
    metrics::Observability,
};

/// Future returned by a [`RefreshFn`]
pub type RefreshFuture<T> = BoxFuture<'static, Result<T, ProviderError>>;

/// Function retrieving fresh data for a cache entry, it must honour the given token
pub type RefreshFn<T> = Arc<dyn Fn(CancellationToken) -> RefreshFuture<T> + Send + Sync>;

/// Outcome of a cache lookup
#[derive(Debug, PartialEq)]
pub enum Lookup<T> {
    /// The data is within its freshness horizon, or was just fetched
    Fresh(T),
    /// The data is past the stale threshold, a refresh has been scheduled
    Stale(T),
    /// There's no usable data
    Miss,
}

impl<T> Lookup<T> {
    /// Returns the data, if any
    pub fn into_data(self) -> Option<T> {
        match self {
            Lookup::Fresh(data) | Lookup::Stale(data) => Some(data),
            Lookup::Miss => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Lookup::Stale(_))
    }
}

/// Timings and sizing of the stale-while-revalidate cache
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Time-to-live of an entry
    pub ttl: Duration,
    /// Age after which a hit schedules a background refresh
    pub interval: Duration,
    /// Age after which an entry is served as stale
    pub stale_threshold: Duration,
    /// Timeout of each background refresh
    pub timeout: Duration,
    /// Number of background workers
    pub workers: usize,
    /// Capacity of the refresh queue
    pub queue_size: usize,
}

impl RefreshPolicy {
    pub fn new(cache: &CacheConfig, refresh: &RefreshConfig) -> Self {
        Self {
            ttl: cache.ttl,
            interval: refresh.interval,
            stale_threshold: refresh.stale_threshold,
            timeout: refresh.timeout,
            workers: refresh.workers,
            queue_size: refresh.queue_size,
        }
    }

    /// Age after which an entry is no longer served at all
    pub fn max_age(&self) -> Duration {
        self.ttl.saturating_add(self.stale_threshold)
    }
}

struct RefreshRequest<T> {
    key: String,
    region: String,
    query: String,
    refresh: RefreshFn<T>,
}

/// State shared between the cache front and its workers
struct Shared {
    store: CacheStore,
    policy: RefreshPolicy,
    in_flight: Mutex<HashSet<String>>,
    metrics: CacheMetrics,
    obs: Observability,
}

/// Removes the in-flight marker of a key when dropped
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    key: &'a str,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(self.key);
    }
}

/// A stale-while-revalidate front over a [`CacheStore`].
///
/// Lookups serve whatever is on disk according to its age and schedule background refreshes, which are processed by a
/// fixed pool of workers consuming a bounded queue. A key is never queued twice while its refresh is in flight.
pub struct RefreshingCache<T> {
    shared: Arc<Shared>,
    queue: mpsc::Sender<RefreshRequest<T>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    token: CancellationToken,
}

impl<T> RefreshingCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Builds the cache and spawns its workers, which stop when the token is cancelled or the cache is closed
    pub fn new(store: CacheStore, policy: RefreshPolicy, obs: Observability, token: &CancellationToken) -> Self {
        let (queue, rx) = mpsc::channel(policy.queue_size.max(1));
        let rx = Arc::new(AsyncMutex::new(rx));
        let token = token.child_token();
        let shared = Arc::new(Shared {
            store,
            policy,
            in_flight: Mutex::new(HashSet::new()),
            metrics: CacheMetrics::default(),
            obs,
        });

        let workers = (0..policy.workers)
            .map(|id| tokio::spawn(worker(id, shared.clone(), rx.clone(), token.clone())))
            .collect();
        tracing::debug!(
            workers = policy.workers,
            queue_size = policy.queue_size,
            "Refreshing cache started"
        );

        Self {
            shared,
            queue,
            workers: Mutex::new(workers),
            token,
        }
    }

    /// The underlying store
    pub fn store(&self) -> &CacheStore {
        &self.shared.store
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.shared.policy
    }

    /// Snapshot of the lookup and refresh counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Number of keys with a refresh queued or running
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.lock().len()
    }

    /// Looks up the key, refreshing it in the background or synchronously according to its age.
    ///
    /// - No entry: `refresh` runs now under the caller token, its result is stored and returned as fresh
    /// - Older than TTL + stale threshold: miss, a refresh is scheduled
    /// - Older than the stale threshold: stale hit, a refresh is scheduled
    /// - Older than the refresh interval: hit, a refresh is scheduled
    /// - Otherwise: hit
    ///
    /// Unreadable entries are misses. Only the synchronous refresh can fail the lookup.
    #[instrument(skip(self, refresh, token))]
    pub async fn get_with_refresh(
        &self,
        key: &str,
        region: &str,
        query: &str,
        refresh: RefreshFn<T>,
        token: &CancellationToken,
    ) -> Result<Lookup<T>, ProviderError> {
        self.lookup(key, region, query, refresh, token, false).await
    }

    /// Looks up the key like [`get_with_refresh`](Self::get_with_refresh), but expired entries are fetched right away
    /// under the caller token instead of being refreshed in the background.
    ///
    /// Only unreadable entries are misses.
    #[instrument(skip(self, refresh, token))]
    pub async fn get_or_fetch(
        &self,
        key: &str,
        region: &str,
        query: &str,
        refresh: RefreshFn<T>,
        token: &CancellationToken,
    ) -> Result<Lookup<T>, ProviderError> {
        self.lookup(key, region, query, refresh, token, true).await
    }

    async fn lookup(
        &self,
        key: &str,
        region: &str,
        query: &str,
        refresh: RefreshFn<T>,
        token: &CancellationToken,
        fetch_expired: bool,
    ) -> Result<Lookup<T>, ProviderError> {
        let shared = &self.shared;
        let entry = match shared.store.read::<T>(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                shared.metrics.record_miss();
                tracing::debug!("Cache miss, fetching synchronously");
                return self.refresh_now(key, region, query, refresh, token).await.map(Lookup::Fresh);
            }
            Err(err) => {
                shared.metrics.record_miss();
                tracing::debug!("Unreadable cache entry, treated as a miss: {err}");
                return Ok(Lookup::Miss);
            }
        };

        let age = entry.age(shared.store.now());
        let policy = &shared.policy;
        let request = || RefreshRequest {
            key: key.to_owned(),
            region: region.to_owned(),
            query: query.to_owned(),
            refresh: refresh.clone(),
        };
        if age > policy.max_age() && fetch_expired {
            shared.metrics.record_miss();
            tracing::debug!(?age, "Cache entry expired, fetching synchronously");
            self.refresh_now(key, region, query, refresh.clone(), token).await.map(Lookup::Fresh)
        } else if age > policy.max_age() {
            shared.metrics.record_miss();
            tracing::debug!(?age, "Cache entry expired");
            self.schedule(request());
            Ok(Lookup::Miss)
        } else if age > policy.stale_threshold {
            shared.metrics.record_stale_hit();
            tracing::debug!(?age, "Stale cache hit");
            self.schedule(request());
            Ok(Lookup::Stale(entry.data))
        } else if age > policy.interval {
            shared.metrics.record_hit();
            tracing::debug!(?age, "Cache hit, due for refresh");
            self.schedule(request());
            Ok(Lookup::Fresh(entry.data))
        } else {
            shared.metrics.record_hit();
            tracing::debug!(?age, "Cache hit");
            Ok(Lookup::Fresh(entry.data))
        }
    }

    /// Reads the entry for the key without affecting the counters, flagging whether it's stale
    pub async fn inspect(&self, key: &str) -> Option<CacheEntry<T>> {
        let mut entry = self.shared.store.read::<T>(key).await.ok().flatten()?;
        entry.is_stale = entry.age(self.shared.store.now()) > self.shared.policy.stale_threshold;
        Some(entry)
    }

    /// Stops the workers, waiting for them to finish
    pub async fn close(&self) {
        self.token.cancel();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(err) = handle.await {
                tracing::error!("Refresh worker failed: {err}");
            }
        }
        tracing::debug!("Refreshing cache closed");
    }

    async fn refresh_now(
        &self,
        key: &str,
        region: &str,
        query: &str,
        refresh: RefreshFn<T>,
        token: &CancellationToken,
    ) -> Result<T, ProviderError> {
        let shared = &self.shared;
        let started = Instant::now();
        let data = refresh(token.clone()).await.inspect_err(|_| shared.metrics.record_refresh_failure())?;
        if let Err(err) = shared.store.set(key, &data, region, query).await {
            tracing::warn!("Couldn't store the fetched data: {err}");
        }
        shared
            .metrics
            .record_refresh_success(started.elapsed(), shared.store.now());
        Ok(data)
    }

    /// Queues a background refresh unless one is already in flight for the same key
    fn schedule(&self, request: RefreshRequest<T>) {
        if !self.shared.in_flight.lock().insert(request.key.clone()) {
            tracing::trace!(key = %request.key, "Refresh already in flight");
            return;
        }
        match self.queue.try_send(request) {
            Ok(()) => self.shared.metrics.record_queued(),
            Err(TrySendError::Full(request) | TrySendError::Closed(request)) => {
                // The request never reaches a worker, so the marker is cleared here
                self.shared.in_flight.lock().remove(&request.key);
                self.shared.metrics.record_dropped();
                tracing::warn!(key = %request.key, "Refresh queue unavailable, request dropped");
            }
        }
    }
}

impl<T> Drop for RefreshingCache<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn worker<T>(
    id: usize,
    shared: Arc<Shared>,
    rx: Arc<AsyncMutex<mpsc::Receiver<RefreshRequest<T>>>>,
    token: CancellationToken,
) where
    T: Serialize + Send + Sync + 'static,
{
    loop {
        let request = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            request = async { rx.lock().await.recv().await } => match request {
                Some(request) => request,
                None => break,
            },
        };
        shared.process(request, &token).await;
    }
    tracing::trace!("Refresh worker {id} stopped");
}

impl Shared {
    /// Runs a single background refresh, rewriting the entry on success
    #[instrument(skip_all, fields(key = %request.key))]
    async fn process<T>(&self, request: RefreshRequest<T>, token: &CancellationToken)
    where
        T: Serialize + Send + Sync,
    {
        let RefreshRequest {
            key,
            region,
            query,
            refresh,
        } = request;
        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            key: &key,
        };

        let started = Instant::now();
        let res = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ProviderError::Cancelled),
            res = tokio::time::timeout(self.policy.timeout, refresh(token.child_token())) => {
                res.unwrap_or(Err(ProviderError::Timeout))
            }
        };
        let elapsed = started.elapsed();
        self.obs.refresh_duration.observe_duration(elapsed);

        match res {
            Ok(data) => {
                let now = self.store.now();
                let attempt = match self.store.read::<IgnoredAny>(&key).await {
                    Ok(Some(previous)) => previous.refresh_attempt + 1,
                    _ => 1,
                };
                let mut entry = CacheEntry::new(data, region, query, now);
                entry.last_refresh = Some(now);
                entry.refresh_attempt = attempt;
                match self.store.write(&key, &entry).await {
                    Ok(()) => {
                        self.metrics.record_refresh_success(elapsed, now);
                        tracing::debug!(?elapsed, attempt, "Background refresh completed");
                    }
                    Err(err) => {
                        self.metrics.record_refresh_failure();
                        tracing::warn!("Couldn't store refreshed data: {err}");
                    }
                }
            }
            Err(ProviderError::Cancelled) => {
                self.metrics.record_refresh_failure();
                tracing::debug!("Background refresh cancelled");
            }
            Err(err) => {
                self.metrics.record_refresh_failure();
                tracing::warn!(?elapsed, "Background refresh failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::FutureExt;
    use pretty_assertions::assert_eq;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::cache::testing::ManualClock;

    type Data = Vec<String>;

    fn policy(workers: usize, queue_size: usize) -> RefreshPolicy {
        RefreshPolicy {
            ttl: Duration::from_millis(100),
            interval: Duration::from_millis(100),
            stale_threshold: Duration::from_millis(200),
            timeout: Duration::from_secs(2),
            workers,
            queue_size,
        }
    }

    async fn setup(policy: RefreshPolicy) -> (tempfile::TempDir, Arc<ManualClock>, RefreshingCache<Data>) {
        let tmp = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let store = CacheStore::open(tmp.path(), policy.ttl, 1024 * 1024, clock.clone())
            .await
            .unwrap();
        let cache = RefreshingCache::new(store, policy, Observability::default(), &CancellationToken::new());
        (tmp, clock, cache)
    }

    fn data(items: &[&str]) -> Data {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// A refresh function counting its calls, blocked until the gate has permits
    fn gated(calls: Arc<AtomicUsize>, gate: Arc<Semaphore>, result: Result<Data, ProviderError>) -> RefreshFn<Data> {
        Arc::new(move |_| {
            let calls = calls.clone();
            let gate = gate.clone();
            let result = result.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.acquire().await.unwrap().forget();
                result
            }
            .boxed()
        })
    }

    async fn eventually(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    #[tokio::test]
    async fn test_missing_entry_is_fetched_synchronously() {
        let (_tmp, _clock, cache) = setup(policy(1, 10)).await;
        let token = CancellationToken::new();
        let refresh: RefreshFn<Data> = Arc::new(|_| async { Ok(data(&["web-01"])) }.boxed());

        let res = cache.get_with_refresh("k", "eu", "web", refresh.clone(), &token).await;
        assert_eq!(res, Ok(Lookup::Fresh(data(&["web-01"]))));
        assert_eq!(cache.store().get::<Data>("k").await, Some(data(&["web-01"])));

        let failing: RefreshFn<Data> = Arc::new(|_| async { Err(ProviderError::Unavailable("down".into())) }.boxed());
        let res = cache.get_with_refresh("other", "eu", "", failing, &token).await;
        assert_eq!(res, Err(ProviderError::Unavailable("down".into())));

        let metrics = cache.metrics();
        assert_eq!(metrics.misses, 2);
        assert_eq!(metrics.refresh_successes, 1);
        assert_eq!(metrics.refresh_failures, 1);
    }

    #[tokio::test]
    async fn test_lookup_protocol_over_time() {
        let (_tmp, clock, cache) = setup(policy(2, 10)).await;
        let token = CancellationToken::new();
        cache.store().set("k", &data(&["a"]), "eu", "").await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let refresh = gated(calls.clone(), gate.clone(), Err(ProviderError::Unavailable("down".into())));

        // Past the refresh interval, a single refresh is queued even when looked up twice
        clock.advance(Duration::from_millis(150));
        for _ in 0..2 {
            let res = cache.get_with_refresh("k", "eu", "", refresh.clone(), &token).await;
            assert_eq!(res, Ok(Lookup::Fresh(data(&["a"]))));
        }
        assert_eq!(cache.in_flight(), 1);
        assert_eq!(cache.metrics().refreshes_queued, 1);
        gate.add_permits(100);
        eventually(|| cache.in_flight() == 0).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.metrics().refresh_failures, 1);

        // Failed refreshes leave the entry untouched
        clock.advance(Duration::from_millis(100));
        let res = cache.get_with_refresh("k", "eu", "", refresh.clone(), &token).await;
        assert_eq!(res, Ok(Lookup::Stale(data(&["a"]))));
        assert!(cache.inspect("k").await.unwrap().is_stale);
        eventually(|| cache.in_flight() == 0).await;

        clock.advance(Duration::from_millis(100));
        let res = cache.get_with_refresh("k", "eu", "", refresh, &token).await;
        assert_eq!(res, Ok(Lookup::Miss));

        let metrics = cache.metrics();
        assert_eq!((metrics.hits, metrics.stale_hits, metrics.misses), (2, 1, 1));
        assert_eq!(metrics.hit_rate(), 0.75);
    }

    #[tokio::test]
    async fn test_expired_entry_is_fetched_once_by_the_caller() {
        let (_tmp, clock, cache) = setup(policy(1, 10)).await;
        let token = CancellationToken::new();
        cache.store().set("k", &data(&["old"]), "eu", "").await.unwrap();
        clock.advance(Duration::from_millis(350));

        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(100));
        let refresh = gated(calls.clone(), gate, Ok(data(&["new"])));

        let res = cache.get_or_fetch("k", "eu", "", refresh, &token).await;
        assert_eq!(res, Ok(Lookup::Fresh(data(&["new"]))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(cache.store().get::<Data>("k").await, Some(data(&["new"])));

        let metrics = cache.metrics();
        assert_eq!((metrics.misses, metrics.refreshes_queued), (1, 0));
    }

    #[tokio::test]
    async fn test_background_refresh_rewrites_entry() {
        let (_tmp, clock, cache) = setup(policy(1, 10)).await;
        let token = CancellationToken::new();
        cache.store().set("k", &data(&["old"]), "eu", "q").await.unwrap();
        clock.advance(Duration::from_millis(250));

        let refresh: RefreshFn<Data> = Arc::new(|_| async { Ok(data(&["new"])) }.boxed());
        let res = cache.get_with_refresh("k", "eu", "q", refresh, &token).await;
        // The lookup is a snapshot, the refresh doesn't change what was returned
        assert_eq!(res, Ok(Lookup::Stale(data(&["old"]))));
        eventually(|| cache.in_flight() == 0).await;

        let entry = cache.inspect("k").await.unwrap();
        assert_eq!(entry.data, data(&["new"]));
        assert_eq!(entry.refresh_attempt, 1);
        assert_eq!(entry.query, "q");
        assert!(entry.last_refresh.is_some());
        assert!(!entry.is_stale);
        assert_eq!(cache.metrics().refresh_successes, 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_request_and_clears_marker() {
        let (_tmp, clock, cache) = setup(policy(1, 1)).await;
        let token = CancellationToken::new();
        for key in ["a", "b", "c"] {
            cache.store().set(key, &data(&[key]), "eu", "").await.unwrap();
        }
        clock.advance(Duration::from_millis(150));

        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let refresh = gated(calls.clone(), gate.clone(), Ok(data(&["x"])));

        // The only worker takes the first request and blocks
        cache.get_with_refresh("a", "eu", "", refresh.clone(), &token).await.unwrap();
        eventually(|| calls.load(Ordering::SeqCst) == 1).await;
        // The second one fills the queue and the third is dropped
        cache.get_with_refresh("b", "eu", "", refresh.clone(), &token).await.unwrap();
        cache.get_with_refresh("c", "eu", "", refresh.clone(), &token).await.unwrap();
        assert_eq!(cache.in_flight(), 2);
        assert_eq!(cache.metrics().refreshes_dropped, 1);

        gate.add_permits(100);
        eventually(|| cache.in_flight() == 0).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_timeout() {
        let mut policy = policy(1, 10);
        policy.timeout = Duration::from_millis(20);
        let (_tmp, clock, cache) = setup(policy).await;
        let token = CancellationToken::new();
        cache.store().set("k", &data(&["a"]), "eu", "").await.unwrap();
        clock.advance(Duration::from_millis(150));

        let refresh: RefreshFn<Data> = Arc::new(|_| futures_util::future::pending().boxed());
        cache.get_with_refresh("k", "eu", "", refresh, &token).await.unwrap();
        eventually(|| cache.in_flight() == 0).await;

        assert_eq!(cache.metrics().refresh_failures, 1);
        assert_eq!(cache.store().read::<Data>("k").await.unwrap().unwrap().data, data(&["a"]));
    }

    #[tokio::test]
    async fn test_close_stops_workers() {
        let (_tmp, clock, cache) = setup(policy(3, 10)).await;
        let token = CancellationToken::new();
        cache.store().set("k", &data(&["a"]), "eu", "").await.unwrap();
        cache.close().await;

        clock.advance(Duration::from_millis(150));
        let refresh: RefreshFn<Data> = Arc::new(|_| async { Ok(data(&["b"])) }.boxed());
        let res = cache.get_with_refresh("k", "eu", "", refresh, &token).await;
        assert_eq!(res, Ok(Lookup::Fresh(data(&["a"]))));
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(cache.metrics().refreshes_dropped, 1);
    }
}
