//! The identity cache facade.

use std::sync::Arc;

use idcache_backend::{BackendError, CacheBackend, MemoryBackend};
use idcache_core::{
    CacheKey, CacheKeyBuilder, CachedValue, Codec, EmbeddedBundle, EntityRegistry, IdCacheError,
    JsonCodec, LifecycleEvent, Record, RecordId, Result,
};
use tracing::info;

use crate::adapter::BackendAdapter;
use crate::config::IdCacheConfig;
use crate::embedded::EmbeddedAssociationCache;
use crate::fetcher::CacheFetcher;
use crate::guard::{ConsistencyGuard, GuardOutcome};
use crate::index::IndexCache;
use crate::instrumentation::{InstrumentationBus, LogSubscriber, Subscriber};
use crate::invalidation::{InvalidationReport, Invalidator, LifecycleHooks};
use crate::loader::RecordLoader;
use crate::metrics::{CacheMetrics, MetricsSubscriber};

/// A record cache in front of a data loader.
///
/// Built explicitly with [`IdentityCache::builder`]; there is no global
/// instance. All clones of the handles it hands out share the same backend.
///
/// # Example
///
/// ```ignore
/// use idcache::{EntityDefinition, EntityRegistry, IdentityCache, LifecycleEvent};
///
/// let registry = EntityRegistry::builder()
///     .entity(EntityDefinition::new("Item").column("sku", "text"))
///     .entity(EntityDefinition::new("Order").embeds_many("items", "Item"))
///     .build()?;
///
/// let cache = IdentityCache::builder()
///     .registry(registry)
///     .loader(Arc::new(SqlLoader::new(pool)))
///     .build()?;
///
/// let order = cache.fetch("Order", 42).await?;
///
/// // after the transaction commits
/// let event = LifecycleEvent::updated("Item", 7)
///     .with_parent_key(cache.record_key("Order", 42)?);
/// cache.dispatch(&event).await;
/// ```
pub struct IdentityCache {
    config: IdCacheConfig,
    registry: Arc<EntityRegistry>,
    adapter: Arc<BackendAdapter>,
    fetcher: Arc<CacheFetcher>,
    index: IndexCache,
    guard: ConsistencyGuard,
    invalidator: Arc<Invalidator>,
    hooks: LifecycleHooks,
    bus: InstrumentationBus,
    metrics: CacheMetrics,
}

impl IdentityCache {
    pub fn builder() -> IdentityCacheBuilder {
        IdentityCacheBuilder::default()
    }

    /// Fetches one record with its embedded associations.
    pub async fn fetch(
        &self,
        entity: &str,
        id: impl Into<RecordId>,
    ) -> Result<Option<EmbeddedBundle>> {
        self.fetcher.fetch_one(entity, &id.into()).await
    }

    /// Fetches many records; one result per id, in order.
    pub async fn fetch_many(
        &self,
        entity: &str,
        ids: &[RecordId],
    ) -> Result<Vec<Option<EmbeddedBundle>>> {
        self.fetcher.fetch_many(entity, ids).await
    }

    /// Fetches a record that must exist.
    pub async fn fetch_required(&self, entity: &str, id: impl Into<RecordId>) -> Result<EmbeddedBundle> {
        self.fetcher.fetch_required(entity, &id.into()).await
    }

    /// Fetches the children of one association.
    pub async fn fetch_association(
        &self,
        entity: &str,
        id: impl Into<RecordId>,
        association: &str,
    ) -> Result<Vec<Record>> {
        self.fetcher
            .fetch_association(entity, &id.into(), association)
            .await
    }

    /// Fetches the records matching a secondary-index lookup.
    pub async fn fetch_by_index(
        &self,
        entity: &str,
        index: &str,
        values: impl Into<RecordId>,
    ) -> Result<Vec<EmbeddedBundle>> {
        self.index
            .fetch_by_index(entity, index, &values.into())
            .await
    }

    /// Key of a record, for [`LifecycleEvent::with_parent_key`].
    pub fn record_key(&self, entity: &str, id: impl Into<RecordId>) -> Result<CacheKey> {
        self.fetcher.keys().record_key(entity, &id.into())
    }

    /// Key of an index lookup, for [`LifecycleEvent::with_index_key`].
    pub fn index_key(
        &self,
        entity: &str,
        index: &str,
        values: impl Into<RecordId>,
    ) -> Result<CacheKey> {
        self.fetcher.keys().index_key(entity, index, &values.into())
    }

    pub fn key_builder(&self) -> &CacheKeyBuilder {
        self.fetcher.keys()
    }

    /// Rewrites a cached value under CAS. See [`ConsistencyGuard::update`].
    pub async fn update<F>(&self, key: &CacheKey, transform: F) -> GuardOutcome
    where
        F: FnMut(CachedValue) -> Option<CachedValue> + Send,
    {
        self.guard.update(key, transform).await
    }

    /// Runs every lifecycle handler for a committed mutation.
    pub async fn dispatch(&self, event: &LifecycleEvent) -> InvalidationReport {
        self.hooks.dispatch(event).await
    }

    /// Handlers run by [`dispatch`](Self::dispatch). The invalidator is
    /// registered first.
    pub fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }

    pub fn invalidator(&self) -> &Arc<Invalidator> {
        &self.invalidator
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.bus.subscribe(subscriber);
    }

    pub fn bus(&self) -> &InstrumentationBus {
        &self.bus
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &IdCacheConfig {
        &self.config
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        self.adapter.backend()
    }

    /// Checks that the backend is reachable.
    pub async fn health_check(&self) -> std::result::Result<(), BackendError> {
        self.adapter.backend().health_check().await
    }

    /// Closes the backend. Later fetches fall back to the loader.
    pub async fn shutdown(&self) -> std::result::Result<(), BackendError> {
        info!(
            backend = %self.adapter.backend().name(),
            hit_rate = self.metrics.hit_rate(),
            "Shutting down identity cache"
        );
        self.adapter.backend().close().await
    }
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCache")
            .field("config", &self.config)
            .field("backend", &self.adapter.backend().name())
            .field("entities", &self.registry.len())
            .finish()
    }
}

/// Builder for [`IdentityCache`].
#[derive(Default)]
pub struct IdentityCacheBuilder {
    config: Option<IdCacheConfig>,
    registry: Option<Arc<EntityRegistry>>,
    backend: Option<Arc<dyn CacheBackend>>,
    loader: Option<Arc<dyn RecordLoader>>,
    codec: Option<Arc<dyn Codec>>,
    subscribers: Vec<Arc<dyn Subscriber>>,
    log_events: bool,
}

impl IdentityCacheBuilder {
    /// Sets the configuration (default: `IdCacheConfig::default()`).
    pub fn config(mut self, config: IdCacheConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the frozen entity registry. Required.
    pub fn registry(mut self, registry: EntityRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Sets the backend (default: an in-process `MemoryBackend`).
    pub fn backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the data loader. Required.
    pub fn loader(mut self, loader: Arc<dyn RecordLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Sets the payload codec (default: `JsonCodec`).
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Adds an instrumentation subscriber.
    pub fn subscriber(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Logs every instrumentation event at debug level.
    pub fn log_events(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    /// Wires the components together.
    ///
    /// # Errors
    ///
    /// Returns `IdCacheError::Config` if the registry or loader is missing,
    /// or the configuration is invalid.
    pub fn build(self) -> Result<IdentityCache> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let registry = self
            .registry
            .ok_or_else(|| IdCacheError::config("an entity registry is required"))?;
        let loader = self
            .loader
            .ok_or_else(|| IdCacheError::config("a record loader is required"))?;
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryBackend::default()));
        let codec = self.codec.unwrap_or_else(|| Arc::new(JsonCodec));

        let bus = InstrumentationBus::new();
        let metrics = CacheMetrics::new();
        bus.subscribe(Arc::new(MetricsSubscriber::new(metrics.clone())));
        if self.log_events {
            bus.subscribe(Arc::new(LogSubscriber));
        }
        for subscriber in self.subscribers {
            bus.subscribe(subscriber);
        }

        let keys = CacheKeyBuilder::new(config.namespace.clone(), Arc::clone(&registry));
        let adapter = Arc::new(BackendAdapter::new(backend, codec, bus.clone(), &config));
        let embedded = Arc::new(EmbeddedAssociationCache::new(
            Arc::clone(&registry),
            loader,
            bus.clone(),
        ));
        let fetcher = Arc::new(CacheFetcher::new(
            Arc::clone(&adapter),
            Arc::clone(&embedded),
            keys.clone(),
            &config,
        ));
        let guard = ConsistencyGuard::new(Arc::clone(&adapter), config.cas_max_retries);
        let invalidator = Arc::new(Invalidator::new(
            Arc::clone(&adapter),
            embedded,
            keys,
            &config,
        ));

        let hooks = LifecycleHooks::new();
        hooks.register(invalidator.clone());

        info!(
            namespace = %config.namespace,
            backend = %adapter.backend().name(),
            entities = registry.len(),
            enabled = config.enabled,
            "Identity cache initialized"
        );

        Ok(IdentityCache {
            index: IndexCache::new(Arc::clone(&fetcher)),
            config,
            registry,
            adapter,
            fetcher,
            guard,
            invalidator,
            hooks,
            bus,
            metrics,
        })
    }
}
