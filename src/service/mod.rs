use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use futures_util::FutureExt;
use itertools::Itertools;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{
    cache::{CacheStore, Lookup, MetricsSnapshot, RefreshFn, RefreshPolicy, RefreshingCache, SystemClock, cache_key},
    config::Config,
    errors::{ProviderError, Result},
    metrics::Observability,
    model::{Query, Record, RecordKind},
};

crate::using! {
    pub provider,
    pub enrich,
    pub sanity,
}

/// A list of records served by the [`FleetService`]
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub records: Vec<Record>,
    /// Whether the records were served past their stale threshold
    pub stale: bool,
    /// Whether the list was cut at the configured ceiling
    pub truncated: bool,
}

/// Retrieves records straight from the providers
#[derive(Clone)]
struct Fetcher {
    providers: Providers,
    enricher: Enricher,
    timeout: Duration,
    max_records: usize,
    obs: Observability,
}

impl Fetcher {
    /// Lists every record of the given kind, enriching the identifiers into full records
    async fn fetch(&self, kind: RecordKind, token: &CancellationToken) -> Result<Vec<Record>, ProviderError> {
        let provider = self.providers.get(kind)?;
        let started = Instant::now();
        let res = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ProviderError::Cancelled),
            res = tokio::time::timeout(self.timeout, provider.list_identifiers(token)) => {
                res.unwrap_or(Err(ProviderError::Timeout))
            }
        };
        self.obs.provider_latency.observe_duration(started.elapsed());

        let mut ids = res?.into_iter().unique().collect::<Vec<_>>();
        if ids.len() > self.max_records {
            tracing::warn!(
                "Listed {} {kind} resources, only the first {} are loaded",
                ids.len(),
                self.max_records
            );
            ids.truncate(self.max_records);
        }
        tracing::debug!("Listed {} {kind} resources", ids.len());

        self.enricher.enrich(kind, provider.as_ref(), ids, token).await
    }

    async fn describe(&self, kind: RecordKind, id: &str, token: &CancellationToken) -> Result<Record, ProviderError> {
        let provider = self.providers.get(kind)?;
        let started = Instant::now();
        let res = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ProviderError::Cancelled),
            res = tokio::time::timeout(self.timeout, provider.describe(id, token)) => {
                res.unwrap_or(Err(ProviderError::Timeout))
            }
        };
        self.obs.provider_latency.observe_duration(started.elapsed());
        res
    }
}

/// Resource loader, serving listings through the cache and single records straight from the providers
#[derive(Clone)]
pub struct FleetService {
    fetcher: Fetcher,
    cache: Option<Arc<RefreshingCache<Vec<Record>>>>,
    region: String,
    regions: Vec<String>,
}

impl FleetService {
    /// Creates a new service, listings are cached only if a cache is provided
    pub fn new(
        providers: Providers,
        config: &Config,
        cache: Option<RefreshingCache<Vec<Record>>>,
        obs: Observability,
    ) -> Self {
        Self {
            fetcher: Fetcher {
                providers,
                enricher: Enricher::new(config.provider.concurrency, config.provider.timeout, obs.clone()),
                timeout: config.provider.timeout,
                max_records: config.max_records,
                obs,
            },
            cache: cache.map(Arc::new),
            region: config.provider.region.clone(),
            regions: config.provider.regions.clone(),
        }
    }

    /// Creates a new service, opening the on-disk cache unless it's disabled.
    ///
    /// The cache workers stop when the token is cancelled. A cache that can't be opened is logged and skipped.
    #[instrument(skip_all)]
    pub async fn init(
        config: &Config,
        providers: Providers,
        no_cache: bool,
        obs: Observability,
        token: &CancellationToken,
    ) -> Self {
        let cache = if config.cache.enabled && !no_cache {
            match CacheStore::open(
                &config.cache.dir,
                config.cache.ttl,
                config.cache.max_file_size,
                Arc::new(SystemClock),
            )
            .await
            {
                Ok(store) => {
                    let policy = RefreshPolicy::new(&config.cache, &config.refresh);
                    Some(RefreshingCache::new(store, policy, obs.clone(), token))
                }
                Err(err) => {
                    tracing::warn!("Couldn't open the cache, listings won't be cached: {err}");
                    None
                }
            }
        } else {
            tracing::debug!("Cache disabled");
            None
        };
        Self::new(providers, config, cache, obs)
    }

    /// Lists the records of the given kind.
    ///
    /// The listing is served from the cache when possible, the query only identifies the cache entry: the records are
    /// not filtered here.
    #[instrument(skip_all, fields(%kind, query = %query))]
    pub async fn list(&self, kind: RecordKind, query: &Query, token: &CancellationToken) -> Result<Listing> {
        let Some(cache) = &self.cache else {
            let records = self
                .fetcher
                .fetch(kind, token)
                .await
                .map_err(|err| err.into_app_error(kind))?;
            return Ok(self.cap(kind, records, false));
        };

        let key = cache_key(kind, &self.region, query);
        let fetcher = self.fetcher.clone();
        let refresh: RefreshFn<Vec<Record>> = Arc::new(move |token| {
            let fetcher = fetcher.clone();
            async move { fetcher.fetch(kind, &token).await }.boxed()
        });

        let lookup = cache
            .get_or_fetch(&key, &self.region, &query.raw, refresh, token)
            .await
            .map_err(|err| err.into_app_error(kind))?;
        let listing = match lookup {
            Lookup::Fresh(records) => self.cap(kind, records, false),
            Lookup::Stale(records) => self.cap(kind, records, true),
            // Unreadable entry, nothing was scheduled for it
            Lookup::Miss => {
                let records = self
                    .fetcher
                    .fetch(kind, token)
                    .await
                    .map_err(|err| err.into_app_error(kind))?;
                if let Err(err) = cache.store().set(&key, &records, &self.region, &query.raw).await {
                    tracing::warn!("Couldn't store the listing: {err}");
                }
                self.cap(kind, records, false)
            }
        };
        Ok(listing)
    }

    /// Retrieves a single record, bypassing the cache
    #[instrument(skip(self, token))]
    pub async fn one(&self, kind: RecordKind, id: &str, token: &CancellationToken) -> Result<Record> {
        self.fetcher
            .describe(kind, id, token)
            .await
            .map_err(|err| err.into_app_error(kind))
    }

    /// The region being queried
    pub fn current_region(&self) -> &str {
        if self.region.is_empty() { "default" } else { &self.region }
    }

    /// Every known region, starting with the current one
    pub fn regions(&self) -> Vec<String> {
        std::iter::once(self.current_region().to_owned())
            .chain(self.regions.iter().cloned())
            .unique()
            .collect()
    }

    /// Snapshot of the cache counters, if listings are cached
    pub fn cache_metrics(&self) -> Option<MetricsSnapshot> {
        self.cache.as_ref().map(|c| c.metrics())
    }

    /// Stops the background refresh workers
    pub async fn close(&self) {
        if let Some(cache) = &self.cache {
            cache.close().await;
        }
    }

    fn cap(&self, kind: RecordKind, mut records: Vec<Record>, stale: bool) -> Listing {
        let max = self.fetcher.max_records;
        let truncated = records.len() > max;
        if truncated {
            tracing::warn!("Loaded {} {kind} records, truncated to {max}", records.len());
            records.truncate(max);
        }
        Listing {
            records,
            stale,
            truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        cache::CacheEntry,
        errors::{AppError, UserFacingError},
        config::Weights,
        model::{ClusterRecord, ClusterStatus, RecordMeta, VmRecord, VmState},
        utils::{parse_query, rank},
    };

    fn vm(id: &str, name: &str) -> Record {
        Record::Vm(VmRecord {
            meta: RecordMeta {
                id: id.to_owned(),
                name: name.to_owned(),
                ..Default::default()
            },
            state: VmState::Running,
            ..Default::default()
        })
    }

    /// Static provider counting the listings
    struct Counting {
        inner: StaticProvider,
        lists: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ResourceProvider for Counting {
        async fn list_identifiers(&self, token: &CancellationToken) -> Result<Vec<String>, ProviderError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.inner.list_identifiers(token).await
        }

        async fn describe(&self, id: &str, token: &CancellationToken) -> Result<Record, ProviderError> {
            self.inner.describe(id, token).await
        }
    }

    fn config(tmp: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.data_dir = tmp.path().to_path_buf();
        config.cache.dir = tmp.path().join("cache");
        config.provider.region = String::from("eu-west-1");
        config.provider.regions = vec![String::from("us-east-1"), String::from("eu-west-1")];
        config
    }

    #[tokio::test]
    async fn test_list_without_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(&tmp);
        config.max_records = 2;
        let providers = Providers::from_records([vm("i-1", "a"), vm("i-2", "b"), vm("i-3", "c")]);
        let token = CancellationToken::new();
        let service = FleetService::init(&config, providers, true, Observability::default(), &token).await;

        let listing = service.list(RecordKind::Vm, &Query::default(), &token).await.unwrap();
        assert_eq!(listing.records, vec![vm("i-1", "a"), vm("i-2", "b")]);
        assert!(!listing.stale);
        assert!(service.cache_metrics().is_none());
        assert!(!tmp.path().join("cache").exists());
    }

    #[tokio::test]
    async fn test_list_is_served_from_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(&tmp);
        let lists = Arc::new(AtomicUsize::new(0));
        let providers = Providers::default().with(
            RecordKind::Vm,
            Counting {
                inner: StaticProvider::new([vm("i-1", "web-01"), vm("i-2", "db-01")]),
                lists: lists.clone(),
            },
        );
        let token = CancellationToken::new();
        let service = FleetService::init(&config, providers, false, Observability::default(), &token).await;
        let query = parse_query("web");

        let first = service.list(RecordKind::Vm, &query, &token).await.unwrap();
        let second = service.list(RecordKind::Vm, &query, &token).await.unwrap();
        assert_eq!(first.records, second.records);
        assert_eq!(first.records.len(), 2);
        assert_eq!(lists.load(Ordering::SeqCst), 1);

        let metrics = service.cache_metrics().unwrap();
        assert_eq!((metrics.hits, metrics.misses), (1, 1));
        service.close().await;
    }

    #[tokio::test]
    async fn test_clusters_are_described_when_listed() {
        let tmp = tempfile::tempdir().unwrap();
        let cluster = |name: &str, status: ClusterStatus| {
            Record::Cluster(ClusterRecord {
                meta: RecordMeta {
                    id: name.to_owned(),
                    name: name.to_owned(),
                    ..Default::default()
                },
                status,
                version: String::from("1.29"),
                ..Default::default()
            })
        };
        let prod = cluster("prod", ClusterStatus::Active);
        let providers = Providers::from_records([prod.clone(), cluster("old", ClusterStatus::Deleting)]);
        let token = CancellationToken::new();
        let service = FleetService::init(&config(&tmp), providers, true, Observability::default(), &token).await;

        let query = parse_query("state:active");
        let listing = service.list(RecordKind::Cluster, &query, &token).await.unwrap();
        assert_eq!(listing.records.len(), 2);
        let Record::Cluster(listed) = &listing.records[0] else {
            panic!("expected a cluster");
        };
        assert!(!listed.needs_details());
        assert_eq!(listing.records[0], prod);

        let matching = rank(&listing.records, &query, &Weights::default());
        assert_eq!(matching.len(), 1);
        assert_eq!(listing.records[matching[0].0].identifier(), "prod");
    }

    #[tokio::test]
    async fn test_expired_listing_is_fetched_once() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(&tmp);
        let lists = Arc::new(AtomicUsize::new(0));
        let providers = Providers::default().with(
            RecordKind::Vm,
            Counting {
                inner: StaticProvider::new([vm("i-1", "web-01")]),
                lists: lists.clone(),
            },
        );
        let token = CancellationToken::new();
        let service = FleetService::init(&config, providers, false, Observability::default(), &token).await;

        let query = Query::default();
        let key = cache_key(RecordKind::Vm, "eu-west-1", &query);
        let cache = service.cache.clone().unwrap();
        let expired = chrono::Utc::now() - chrono::Duration::hours(1);
        let entry = CacheEntry::new(vec![vm("i-0", "gone")], "eu-west-1", "", expired);
        cache.store().write(&key, &entry).await.unwrap();

        let listing = service.list(RecordKind::Vm, &query, &token).await.unwrap();
        assert_eq!(listing.records, vec![vm("i-1", "web-01")]);
        service.close().await;
        assert_eq!(lists.load(Ordering::SeqCst), 1);
        assert_eq!(service.cache_metrics().unwrap().refreshes_queued, 0);
    }

    #[tokio::test]
    async fn test_provider_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let providers = Providers::from_records([vm("i-1", "a")]);
        let token = CancellationToken::new();
        let service = FleetService::init(&config(&tmp), providers, false, Observability::default(), &token).await;

        let res = service.one(RecordKind::Vm, "i-9", &token).await;
        assert!(matches!(
            res,
            Err(AppError::UserFacing(UserFacingError::RecordNotFound { kind: RecordKind::Vm, ref id })) if id == "i-9"
        ));

        let res = service.list(RecordKind::NodeGroup, &Query::default(), &token).await;
        assert!(matches!(
            res,
            Err(AppError::UserFacing(UserFacingError::ProviderUnavailable { .. }))
        ));

        token.cancel();
        let res = service.list(RecordKind::Vm, &Query::default(), &token).await;
        assert!(matches!(res, Err(AppError::Cancelled)));
    }

    #[tokio::test]
    async fn test_regions() {
        let tmp = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let service =
            FleetService::init(&config(&tmp), Providers::default(), true, Observability::default(), &token).await;
        assert_eq!(service.current_region(), "eu-west-1");
        assert_eq!(service.regions(), vec!["eu-west-1", "us-east-1"]);
    }
}
