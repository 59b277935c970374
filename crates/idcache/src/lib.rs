//! # IdCache
//!
//! Transparent record cache between an application's data-access layer and
//! its relational store.
//!
//! Records are cached under versioned keys in a distributed key-value store,
//! optionally together with their child associations, so a parent with its
//! children costs one cache round-trip instead of N+1 queries.
//!
//! ## Features
//!
//! - Single and batched fetch-or-load with request order preserved
//! - Lossless invalidation: tombstones plus add/CAS fills
//! - CAS-protected read-modify-write with bounded retries
//! - Embedded associations and cached index lookups
//! - Fail-open on backend errors and timeouts
//! - Structured instrumentation feeding metrics and logs
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use idcache::{EntityDefinition, EntityRegistry, IdCacheConfig, IdentityCache};
//!
//! let registry = EntityRegistry::builder()
//!     .entity(EntityDefinition::new("Item"))
//!     .entity(EntityDefinition::new("Order").embeds_many("items", "Item"))
//!     .build()?;
//!
//! let cache = IdentityCache::builder()
//!     .config(IdCacheConfig::load(Some("idcache.toml".as_ref()))?)
//!     .registry(registry)
//!     .loader(Arc::new(my_loader))
//!     .build()?;
//!
//! let order = cache.fetch_required("Order", 42).await?;
//! let items = order.children("items");
//! ```

pub mod adapter;
pub mod cache;
pub mod config;
pub mod embedded;
pub mod fetcher;
pub mod guard;
pub mod index;
pub mod instrumentation;
pub mod invalidation;
pub mod loader;
pub mod metrics;

// Re-exports
pub use adapter::{BackendAdapter, DecodedEntry, Fill, FillMode};
pub use cache::{IdentityCache, IdentityCacheBuilder};
pub use crate::config::{IdCacheConfig, InvalidationMode, ParentRefresh};
pub use embedded::{EmbeddedAssociationCache, LoadedAssociation};
pub use fetcher::CacheFetcher;
pub use guard::{ConsistencyGuard, GuardOutcome};
pub use index::IndexCache;
pub use instrumentation::{
    CacheOperation, CacheOutcome, InstrumentEvent, InstrumentationBus, LogSubscriber, Subscriber,
};
pub use invalidation::{InvalidationReport, Invalidator, LifecycleHandler, LifecycleHooks};
pub use loader::RecordLoader;
pub use crate::metrics::{CacheMetrics, MetricsSubscriber, init_metrics};

// Re-export the lower layers for consumers
pub use idcache_backend;
pub use idcache_core;
pub use idcache_core::{
    CacheKey, CachedValue, EmbeddedBundle, EntityDefinition, EntityRegistry, IdCacheError,
    LifecycleEvent, LoaderError, Record, RecordId, Result, ScalarValue,
};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
