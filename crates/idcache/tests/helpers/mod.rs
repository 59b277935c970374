//! Test helpers para idcache.

#![allow(dead_code, unused_imports)]

pub mod assertions;
pub mod backends;
pub mod gated;
pub mod loader;
pub mod recorder;

use std::sync::{Arc, Once};

use idcache::idcache_backend::{CacheBackend, MemoryBackend};
use idcache::{EntityDefinition, EntityRegistry, IdCacheConfig, IdentityCache, RecordLoader};

pub use assertions::*;
pub use backends::{ContendedBackend, FailingBackend, SlowBackend};
pub use gated::{Gate, GatedLoader};
pub use loader::ShopLoader;
pub use recorder::RecordingSubscriber;

static TRACING: Once = Once::new();

/// Instala un subscriber de tracing una sola vez por binario de test.
/// Filtrable con `RUST_LOG`, por defecto solo warnings.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

/// Item, Order embedding its items, Order index by customer.
pub fn order_registry() -> EntityRegistry {
    EntityRegistry::builder()
        .entity(
            EntityDefinition::new("Item")
                .column("id", "bigint")
                .column("order_id", "bigint")
                .column("sku", "text"),
        )
        .entity(
            EntityDefinition::new("Order")
                .column("id", "bigint")
                .column("customer_id", "bigint")
                .column("total", "integer")
                .embeds_many("items", "Item")
                .index("by_customer", vec!["customer_id"]),
        )
        .build()
        .expect("valid registry")
}

/// Like [`order_registry`], plus an id-cached `tags` association.
pub fn tagged_registry() -> EntityRegistry {
    EntityRegistry::builder()
        .entity(EntityDefinition::new("Item").column("sku", "text"))
        .entity(EntityDefinition::new("Tag").column("name", "text"))
        .entity(
            EntityDefinition::new("Order")
                .column("total", "integer")
                .embeds_many("items", "Item")
                .caches_ids("tags", "Tag"),
        )
        .build()
        .expect("valid registry")
}

/// A wired cache with its collaborators exposed.
pub struct Harness {
    pub cache: IdentityCache,
    pub loader: Arc<ShopLoader>,
    pub events: Arc<RecordingSubscriber>,
    pub backend: Arc<dyn CacheBackend>,
}

impl Harness {
    /// Default config, memory backend, order registry, seeded shop.
    pub fn new() -> Self {
        Self::with(IdCacheConfig::default(), Arc::new(MemoryBackend::default()))
    }

    pub fn with_config(config: IdCacheConfig) -> Self {
        Self::with(config, Arc::new(MemoryBackend::default()))
    }

    pub fn with(config: IdCacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        Self::build(config, backend, order_registry())
    }

    pub fn build(
        config: IdCacheConfig,
        backend: Arc<dyn CacheBackend>,
        registry: EntityRegistry,
    ) -> Self {
        let loader = Arc::new(ShopLoader::seeded());
        Self::assemble(config, backend, registry, loader.clone(), loader)
    }

    /// Order registry over a seeded shop whose association loads can be paused.
    pub fn gated(config: IdCacheConfig) -> (Self, Arc<GatedLoader>) {
        let loader = Arc::new(ShopLoader::seeded());
        let gated = Arc::new(GatedLoader::new(loader.clone()));
        let harness = Self::assemble(
            config,
            Arc::new(MemoryBackend::default()),
            order_registry(),
            loader,
            gated.clone(),
        );
        (harness, gated)
    }

    fn assemble(
        config: IdCacheConfig,
        backend: Arc<dyn CacheBackend>,
        registry: EntityRegistry,
        loader: Arc<ShopLoader>,
        record_loader: Arc<dyn RecordLoader>,
    ) -> Self {
        init_tracing();
        let events = Arc::new(RecordingSubscriber::default());
        let cache = IdentityCache::builder()
            .config(config)
            .registry(registry)
            .backend(backend.clone())
            .loader(record_loader)
            .subscriber(events.clone())
            .log_events(true)
            .build()
            .expect("cache builds");

        Self {
            cache,
            loader,
            events,
            backend,
        }
    }

    /// Forgets recorded events and loader calls.
    pub fn reset(&self) {
        self.events.clear();
        self.loader.reset_calls();
    }
}
