//! Client Cache Manager
//!
//! Owns the named, versioned cache partitions of a client context and
//! dispatches every intercepted fetch to one of three strategies:
//! - **network-first** for volatile content, falling back to the `dynamic`
//!   partition and then to a synthesized offline document
//! - **cache-first** for immutable assets, populating the `static` partition
//!   on miss with single-flight de-duplication
//! - **stale-while-revalidate** for everything else, serving the `runtime`
//!   partition immediately while refreshing it in the background
//!
//! The manager walks an install/activate lifecycle. Activation deletes every
//! partition not in the current-version allow-list before any fetch is
//! dispatched, so no stale-version partition is ever read. That purge is the
//! sole cross-task mutation; dispatch begins only once it has completed.

pub mod deferred;
pub mod partition;
pub mod strategy;

pub use deferred::{DeferredQueue, DeferredWorkItem, ReplayReport};
pub use partition::{CachePartition, PartitionStats, PartitionStore};
pub use strategy::{RouteTable, SingleFlight, Strategy};

use crate::config::CacheConfig;
use crate::dispatch::Origin;
use crate::error::{CirrusError, Result};
use crate::observability;
use crate::types::{RequestMeta, StoredResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Logical partition for long-lived shell assets.
pub const STATIC_PARTITION: &str = "static";
/// Logical partition for network-first content.
pub const DYNAMIC_PARTITION: &str = "dynamic";
/// Logical partition for stale-while-revalidate content.
pub const RUNTIME_PARTITION: &str = "runtime";

/// Lifecycle states of the cache manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Installing,
    Waiting,
    Activating,
    Active,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
        }
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Network,
    Cache,
    Offline,
}

/// Outcome of one intercepted fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Non-GET or non-http(s) request: not handled by any strategy.
    PassThrough,
    /// The request was served by a strategy.
    Served {
        response: StoredResponse,
        strategy: Strategy,
        source: FetchSource,
    },
}

impl FetchOutcome {
    /// The served response, if the request was handled.
    pub fn response(&self) -> Option<&StoredResponse> {
        match self {
            FetchOutcome::Served { response, .. } => Some(response),
            FetchOutcome::PassThrough => None,
        }
    }
}

/// Client-resident cache manager.
pub struct CacheManager {
    config: CacheConfig,
    store: Arc<PartitionStore>,
    routes: RouteTable,
    origin: Arc<dyn Origin>,
    state: RwLock<LifecycleState>,
    single_flight: SingleFlight,
    deferred: Arc<DeferredQueue>,
}

impl CacheManager {
    /// Create a manager in the `Installing` state.
    pub fn new(config: CacheConfig, origin: Arc<dyn Origin>) -> Self {
        let store = Arc::new(PartitionStore::new(config.max_entries_per_partition));
        Self::with_store(config, origin, store)
    }

    /// Full partition name for a logical partition under the current version.
    fn full_name(&self, logical: &str) -> String {
        partition::partition_name(&self.config.partition_prefix, logical, &self.config.version)
    }

    /// Open a logical partition under the current version.
    async fn partition(&self, logical: &str) -> Arc<CachePartition> {
        self.store.open(&self.full_name(logical)).await
    }

    /// Partition names allowed to survive activation.
    fn allow_list(&self) -> Vec<String> {
        vec![
            self.full_name(STATIC_PARTITION),
            self.full_name(DYNAMIC_PARTITION),
            self.full_name(RUNTIME_PARTITION),
        ]
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// The deferred work queue.
    pub fn deferred(&self) -> Arc<DeferredQueue> {
        Arc::clone(&self.deferred)
    }

    /// The partition store (shared with a prior-version manager when
    /// simulating an upgrade).
    pub fn store(&self) -> Arc<PartitionStore> {
        Arc::clone(&self.store)
    }

    /// Create a manager for a new deployment version over an existing store.
    ///
    /// Models the upgrade path: the new version installs alongside the old
    /// partitions, which survive until the new manager activates.
    pub fn with_store(config: CacheConfig, origin: Arc<dyn Origin>, store: Arc<PartitionStore>) -> Self {
        let routes = RouteTable::from_config(&config);
        Self {
            config,
            store,
            routes,
            origin,
            state: RwLock::new(LifecycleState::Installing),
            single_flight: SingleFlight::new(),
            deferred: Arc::new(DeferredQueue::new()),
        }
    }

    /// Install: fetch the critical-resource manifest into the `static`
    /// partition, then move to `Waiting`.
    ///
    /// Individual manifest fetch failures are logged and skipped; the
    /// missing entries will be fetched on demand.
    pub async fn install(&self) -> Result<()> {
        {
            let state = self.state.read().await;
            if *state != LifecycleState::Installing {
                return Err(CirrusError::InvalidState(format!(
                    "install requires installing state, manager is {}",
                    state.as_str()
                )));
            }
        }

        let partition = self.partition(STATIC_PARTITION).await;
        let mut stored = 0usize;
        for path in &self.config.manifest {
            let meta = RequestMeta::get(path);
            match self.origin.fetch(&meta).await {
                Ok(response) if response.is_success() => {
                    partition.put(&meta.cache_key(), response).await;
                    stored += 1;
                }
                Ok(response) => {
                    warn!(path = %path, status = response.status, "Manifest fetch returned non-success, skipping");
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Manifest fetch failed, skipping");
                }
            }
        }

        info!(
            stored,
            manifest = self.config.manifest.len(),
            partition = %partition.name(),
            "Install complete"
        );
        *self.state.write().await = LifecycleState::Waiting;
        Ok(())
    }

    /// Activate: purge every partition not in the current-version allow-list,
    /// then begin serving.
    ///
    /// A purge failure retries up to the configured attempt count; if the
    /// purge still fails, activation stalls in `Activating` rather than
    /// serving from a stale partition.
    pub async fn activate(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != LifecycleState::Waiting {
                return Err(CirrusError::InvalidState(format!(
                    "activate requires waiting state, manager is {}",
                    state.as_str()
                )));
            }
            *state = LifecycleState::Activating;
        }

        let allow = self.allow_list();
        let attempts = self.config.purge_retry_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.store.purge_except(&allow).await {
                Ok(purged) => {
                    if !purged.is_empty() {
                        observability::record_partitions_purged(purged.len());
                        info!(purged = ?purged, "Stale partitions purged");
                    }
                    *self.state.write().await = LifecycleState::Active;
                    info!(version = %self.config.version, "Cache manager active");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Partition purge failed");
                    last_error = e.to_string();
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }

        // Serving from a stale partition would violate the versioning
        // invariant; stay in Activating.
        Err(CirrusError::PurgeFailed {
            attempts,
            reason: last_error,
        })
    }

    /// Queue a request for replay on the next reconnect signal.
    pub async fn defer(&self, meta: RequestMeta) {
        self.deferred.enqueue(meta).await;
    }

    /// Replay the deferred queue against the network now.
    pub async fn replay_deferred(&self) -> ReplayReport {
        self.deferred.replay(self.origin.as_ref()).await
    }

    /// Spawn the reconnect listener; each signal triggers a replay pass.
    pub fn start_reconnect_listener(&self) -> JoinHandle<()> {
        let queue = Arc::clone(&self.deferred);
        let origin = Arc::clone(&self.origin);
        tokio::spawn(queue.run_listener(origin))
    }

    /// Handle one intercepted fetch.
    ///
    /// Only GET requests over http(s) are dispatched; everything else passes
    /// through untouched. Requires the manager to be `Active`.
    pub async fn handle_fetch(&self, meta: &RequestMeta) -> Result<FetchOutcome> {
        {
            let state = self.state.read().await;
            if *state != LifecycleState::Active {
                return Err(CirrusError::InvalidState(format!(
                    "cache manager is {}, not active",
                    state.as_str()
                )));
            }
        }

        if !meta.is_get() || !meta.is_http_scheme() {
            return Ok(FetchOutcome::PassThrough);
        }

        let strategy = self.routes.select(meta);
        debug!(url = %meta.cache_key(), strategy = strategy.as_str(), "Dispatching fetch");
        match strategy {
            Strategy::NetworkFirst => self.network_first(meta).await,
            Strategy::CacheFirst => self.cache_first(meta).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(meta).await,
        }
    }

    /// Network-first: try the network, fall back to the `dynamic` partition,
    /// then to the offline document for document requests.
    async fn network_first(&self, meta: &RequestMeta) -> Result<FetchOutcome> {
        let partition = self.partition(DYNAMIC_PARTITION).await;
        let key = meta.cache_key();

        match self.origin.fetch(meta).await {
            Ok(response) => {
                if response.is_success() {
                    partition.put(&key, response.clone()).await;
                }
                observability::record_strategy(Strategy::NetworkFirst.as_str(), false);
                Ok(FetchOutcome::Served {
                    response,
                    strategy: Strategy::NetworkFirst,
                    source: FetchSource::Network,
                })
            }
            Err(network_error) => {
                if let Some(cached) = partition.match_url(&key).await {
                    debug!(url = %key, "Network failed, serving cached entry");
                    observability::record_strategy(Strategy::NetworkFirst.as_str(), true);
                    return Ok(FetchOutcome::Served {
                        response: cached,
                        strategy: Strategy::NetworkFirst,
                        source: FetchSource::Cache,
                    });
                }

                // Complete failure: queue for replay on reconnect.
                self.deferred.enqueue(meta.clone()).await;

                if meta.accepts_document() {
                    observability::record_offline_document();
                    return Ok(FetchOutcome::Served {
                        response: strategy::offline_response(),
                        strategy: Strategy::NetworkFirst,
                        source: FetchSource::Offline,
                    });
                }

                Err(network_error)
            }
        }
    }

    /// Cache-first: serve the `static` partition, populate on miss. A cold
    /// miss fetched by N concurrent identical requests hits the network once.
    async fn cache_first(&self, meta: &RequestMeta) -> Result<FetchOutcome> {
        let partition = self.partition(STATIC_PARTITION).await;
        let key = meta.cache_key();

        if let Some(cached) = partition.match_url(&key).await {
            observability::record_strategy(Strategy::CacheFirst.as_str(), true);
            return Ok(FetchOutcome::Served {
                response: cached,
                strategy: Strategy::CacheFirst,
                source: FetchSource::Cache,
            });
        }

        let guard = self.single_flight.acquire(&key).await;

        // Another in-flight fetch may have populated the entry while we
        // waited on the guard.
        if let Some(cached) = partition.match_url(&key).await {
            drop(guard);
            self.single_flight.release(&key).await;
            observability::record_strategy(Strategy::CacheFirst.as_str(), true);
            return Ok(FetchOutcome::Served {
                response: cached,
                strategy: Strategy::CacheFirst,
                source: FetchSource::Cache,
            });
        }

        // Store before releasing the guard so waiters re-checking the
        // partition see the entry rather than fetching again.
        let result = self.origin.fetch(meta).await;
        if let Ok(response) = &result {
            if response.is_success() {
                partition.put(&key, response.clone()).await;
            }
        }
        drop(guard);
        self.single_flight.release(&key).await;

        let response = result?;
        observability::record_strategy(Strategy::CacheFirst.as_str(), false);
        Ok(FetchOutcome::Served {
            response,
            strategy: Strategy::CacheFirst,
            source: FetchSource::Network,
        })
    }

    /// Stale-while-revalidate: serve the `runtime` partition immediately and
    /// refresh it in the background; a cold miss waits on the network.
    async fn stale_while_revalidate(&self, meta: &RequestMeta) -> Result<FetchOutcome> {
        let partition = self.partition(RUNTIME_PARTITION).await;
        let key = meta.cache_key();

        if let Some(cached) = partition.match_url(&key).await {
            let origin = Arc::clone(&self.origin);
            let partition = Arc::clone(&partition);
            let meta = meta.clone();
            let revalidate_key = key.clone();
            tokio::spawn(async move {
                match origin.fetch(&meta).await {
                    Ok(response) if response.is_success() => {
                        partition.put(&revalidate_key, response).await;
                    }
                    Ok(response) => {
                        debug!(url = %revalidate_key, status = response.status, "Revalidation returned non-success");
                    }
                    Err(e) => {
                        debug!(url = %revalidate_key, error = %e, "Background revalidation failed");
                    }
                }
            });

            observability::record_strategy(Strategy::StaleWhileRevalidate.as_str(), true);
            return Ok(FetchOutcome::Served {
                response: cached,
                strategy: Strategy::StaleWhileRevalidate,
                source: FetchSource::Cache,
            });
        }

        let response = self.origin.fetch(meta).await?;
        if response.is_success() {
            partition.put(&key, response.clone()).await;
        }
        observability::record_strategy(Strategy::StaleWhileRevalidate.as_str(), false);
        Ok(FetchOutcome::Served {
            response,
            strategy: Strategy::StaleWhileRevalidate,
            source: FetchSource::Network,
        })
    }

    /// Statistics for all partitions in the store.
    pub async fn stats(&self) -> Vec<PartitionStats> {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MapOrigin {
        responses: RwLock<HashMap<String, StoredResponse>>,
        offline: AtomicBool,
        fetches: AtomicUsize,
    }

    impl MapOrigin {
        fn new() -> Self {
            Self {
                responses: RwLock::new(HashMap::new()),
                offline: AtomicBool::new(false),
                fetches: AtomicUsize::new(0),
            }
        }

        async fn insert(&self, path: &str, response: StoredResponse) {
            self.responses
                .write()
                .await
                .insert(path.to_string(), response);
        }
    }

    #[async_trait]
    impl Origin for MapOrigin {
        async fn fetch(&self, meta: &RequestMeta) -> Result<StoredResponse> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(CirrusError::OriginUnavailable("offline".into()));
            }
            self.responses
                .read()
                .await
                .get(&meta.path)
                .cloned()
                .ok_or_else(|| CirrusError::OriginUnavailable("no such path".into()))
        }
    }

    async fn seeded_origin() -> Arc<MapOrigin> {
        let origin = Arc::new(MapOrigin::new());
        for path in CacheConfig::default().manifest {
            origin
                .insert(&path, StoredResponse::new(200, path.as_bytes().to_vec()))
                .await;
        }
        origin
    }

    async fn active_manager(origin: Arc<MapOrigin>) -> CacheManager {
        let manager = CacheManager::new(CacheConfig::default(), origin);
        manager.install().await.unwrap();
        manager.activate().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_install_populates_static_partition() {
        let origin = seeded_origin().await;
        let manager = CacheManager::new(CacheConfig::default(), Arc::clone(&origin) as Arc<dyn Origin>);

        manager.install().await.unwrap();
        assert_eq!(manager.state().await, LifecycleState::Waiting);

        let partition = manager.partition(STATIC_PARTITION).await;
        assert_eq!(partition.len().await, CacheConfig::default().manifest.len());
    }

    #[tokio::test]
    async fn test_install_tolerates_missing_manifest_entries() {
        let origin = Arc::new(MapOrigin::new());
        origin.insert("/", StoredResponse::html("<h1>home</h1>")).await;

        let manager = CacheManager::new(CacheConfig::default(), Arc::clone(&origin) as Arc<dyn Origin>);
        manager.install().await.unwrap();

        assert_eq!(manager.state().await, LifecycleState::Waiting);
        assert_eq!(manager.partition(STATIC_PARTITION).await.len().await, 1);
    }

    #[tokio::test]
    async fn test_fetch_before_activation_rejected() {
        let origin = seeded_origin().await;
        let manager = CacheManager::new(CacheConfig::default(), origin);

        let result = manager.handle_fetch(&RequestMeta::get("/")).await;
        assert!(matches!(result, Err(CirrusError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_lifecycle_transitions_enforced() {
        let origin = seeded_origin().await;
        let manager = CacheManager::new(CacheConfig::default(), origin);

        // Activate before install: rejected.
        assert!(matches!(
            manager.activate().await,
            Err(CirrusError::InvalidState(_))
        ));

        manager.install().await.unwrap();
        // Double install: rejected.
        assert!(matches!(
            manager.install().await,
            Err(CirrusError::InvalidState(_))
        ));

        manager.activate().await.unwrap();
        assert_eq!(manager.state().await, LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let manager = active_manager(seeded_origin().await).await;

        let outcome = manager
            .handle_fetch(&RequestMeta::new("POST", "/api/save"))
            .await
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::PassThrough));

        let extension = RequestMeta::get("/resource").with_scheme("chrome-extension");
        let outcome = manager.handle_fetch(&extension).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::PassThrough));
    }

    #[tokio::test]
    async fn test_activation_purges_previous_version() {
        let origin = seeded_origin().await;

        let v1 = active_manager(Arc::clone(&origin)).await;
        let store = v1.store();
        let v1_static = partition::partition_name("cirrus", STATIC_PARTITION, "v1");
        assert!(store.get(&v1_static).await.is_some());

        // New deployment version over the same store.
        let config = CacheConfig {
            version: "v2".to_string(),
            ..Default::default()
        };
        let v2 = CacheManager::with_store(config, Arc::clone(&origin) as Arc<dyn Origin>, store.clone());
        v2.install().await.unwrap();

        // Before activation the old partitions still exist.
        assert!(store.get(&v1_static).await.is_some());

        v2.activate().await.unwrap();

        // After activation every v1 partition is unreachable.
        for name in store.names().await {
            assert!(name.ends_with("-v2"), "stale partition survived: {}", name);
        }
        assert!(store.get(&v1_static).await.is_none());
    }
}
