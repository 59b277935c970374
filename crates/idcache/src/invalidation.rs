//! Cache invalidation on record lifecycle events.

use std::sync::Arc;

use async_trait::async_trait;
use idcache_backend::StoreOutcome;
use idcache_core::{
    AssociationDefinition, CacheKey, CacheKeyBuilder, LifecycleEvent, LifecycleKind,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::adapter::BackendAdapter;
use crate::config::{IdCacheConfig, ParentRefresh};
use crate::embedded::EmbeddedAssociationCache;

/// Keys an invalidation touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Keys made unusable.
    pub expired: Vec<String>,
    /// Parent keys rewritten with fresh associations.
    pub refreshed: Vec<String>,
    /// Keys the backend could not be reached for.
    pub failed: Vec<String>,
}

impl InvalidationReport {
    /// Number of keys expired or refreshed.
    pub fn count(&self) -> usize {
        self.expired.len() + self.refreshed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0 && self.failed.is_empty()
    }

    pub fn merge(&mut self, other: InvalidationReport) {
        self.expired.extend(other.expired);
        self.refreshed.extend(other.refreshed);
        self.failed.extend(other.failed);
    }
}

/// Reacts to committed record mutations.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    async fn on_lifecycle_event(&self, event: &LifecycleEvent) -> InvalidationReport;
}

/// Ordered registry of lifecycle handlers.
///
/// The application calls [`dispatch`](Self::dispatch) after its transaction
/// commits; every handler has finished when it returns.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    handlers: Arc<RwLock<Vec<Arc<dyn LifecycleHandler>>>>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: Arc<dyn LifecycleHandler>) {
        self.handlers.write().push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every handler in registration order and merges their reports.
    pub async fn dispatch(&self, event: &LifecycleEvent) -> InvalidationReport {
        let handlers = self.handlers.read().clone();

        let mut report = InvalidationReport::default();
        for handler in handlers {
            report.merge(handler.on_lifecycle_event(event).await);
        }
        report
    }
}

impl std::fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("handlers", &self.len())
            .finish()
    }
}

/// Expires or refreshes every key a record mutation makes stale.
///
/// - the record's own key (on create only when negative caching is on)
/// - the keys of parents embedding the record, expired or rebuilt
/// - the cached index lookups listed in the event
pub struct Invalidator {
    adapter: Arc<BackendAdapter>,
    embedded: Arc<EmbeddedAssociationCache>,
    keys: CacheKeyBuilder,
    max_retries: u32,
    enabled: bool,
    negative_cache: bool,
    parent_refresh: ParentRefresh,
}

impl Invalidator {
    pub fn new(
        adapter: Arc<BackendAdapter>,
        embedded: Arc<EmbeddedAssociationCache>,
        keys: CacheKeyBuilder,
        config: &IdCacheConfig,
    ) -> Self {
        Self {
            adapter,
            embedded,
            keys,
            max_retries: config.cas_max_retries,
            enabled: config.enabled,
            negative_cache: config.negative_cache,
            parent_refresh: config.parent_refresh,
        }
    }

    /// Invalidates everything the event makes stale.
    pub async fn invalidate(&self, event: &LifecycleEvent) -> InvalidationReport {
        let mut report = InvalidationReport::default();
        if !self.enabled {
            return report;
        }

        let expire_own = match event.kind() {
            LifecycleKind::Created => self.negative_cache,
            LifecycleKind::Updated | LifecycleKind::Destroyed => true,
        };
        if expire_own {
            match self.keys.record_key(event.entity(), event.id()) {
                Ok(key) => self.expire(&key, &mut report).await,
                Err(e) => debug!(event = %event, error = %e, "no own key to invalidate"),
            }
        }

        for parent_key in event.affected_parent_keys() {
            match self.parent_refresh {
                ParentRefresh::Expire => self.expire(parent_key, &mut report).await,
                ParentRefresh::Rebuild => {
                    self.rebuild_parent(parent_key, event.entity(), &mut report)
                        .await
                },
            }
        }

        for index_key in event.affected_index_keys() {
            self.expire(index_key, &mut report).await;
        }

        info!(
            event = %event,
            expired = report.expired.len(),
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            "cache invalidated"
        );
        report
    }

    async fn expire(&self, key: &CacheKey, report: &mut InvalidationReport) {
        match self.adapter.expire(key).await {
            Ok(()) => report.expired.push(key.to_string()),
            Err(e) => {
                self.adapter.bus().degraded("invalidate", &e);
                report.failed.push(key.to_string());
            },
        }
    }

    /// Reloads the parent's associations to `child_entity` and rewrites its
    /// bundle under CAS. Falls back to expiring the parent.
    ///
    /// Every attempt reads the entry and its token before loading, so a
    /// bundle built from rows older than a concurrent rebuild cannot be
    /// written over it. A parent with no usable entry is expired, which fails
    /// any fill started before the commit.
    async fn rebuild_parent(
        &self,
        parent_key: &CacheKey,
        child_entity: &str,
        report: &mut InvalidationReport,
    ) {
        let associations: Vec<AssociationDefinition> =
            match self.keys.registry().get(parent_key.entity()) {
                Ok(definition) => definition
                    .associations()
                    .iter()
                    .filter(|a| a.child_entity() == child_entity)
                    .cloned()
                    .collect(),
                Err(_) => Vec::new(),
            };
        if associations.is_empty() {
            self.expire(parent_key, report).await;
            return;
        }

        let mut attempts = 0;
        loop {
            attempts += 1;

            let entry = match self.adapter.get(parent_key).await {
                Ok(entry) => entry,
                Err(e) => {
                    self.adapter.bus().degraded("invalidate", &e);
                    self.expire(parent_key, report).await;
                    return;
                },
            };
            let Some((mut bundle, token)) = entry.and_then(|entry| {
                let value = entry.value.ok().filter(|v| !v.is_tombstone())?;
                Some((EmbeddedAssociationCache::unpack(value)?, entry.cas?))
            }) else {
                debug!(key = %parent_key, "no rebuildable parent entry, expiring");
                self.expire(parent_key, report).await;
                return;
            };

            for association in &associations {
                match self
                    .embedded
                    .load_association(parent_key.entity(), parent_key.identifier(), association)
                    .await
                {
                    Ok(data) => data.apply_to(association.name(), &mut bundle),
                    Err(e) => {
                        warn!(key = %parent_key, error = %e, "failed to reload association, expiring parent");
                        self.expire(parent_key, report).await;
                        return;
                    },
                }
            }

            let value = EmbeddedAssociationCache::pack(bundle);
            match self.adapter.cas(parent_key, &value, token).await {
                Ok(StoreOutcome::Stored) => {
                    debug!(key = %parent_key, attempts, "parent bundle rebuilt");
                    report.refreshed.push(parent_key.to_string());
                    return;
                },
                Ok(StoreOutcome::NotFound) => {
                    self.expire(parent_key, report).await;
                    return;
                },
                Ok(StoreOutcome::Conflict | StoreOutcome::Exists) => {
                    if attempts > self.max_retries {
                        warn!(key = %parent_key, attempts, "rebuild retries exhausted, expiring");
                        self.expire(parent_key, report).await;
                        return;
                    }
                    debug!(key = %parent_key, attempts, "parent changed during rebuild, retrying");
                },
                Err(e) => {
                    self.adapter.bus().degraded("invalidate", &e);
                    self.expire(parent_key, report).await;
                    return;
                },
            }
        }
    }
}

#[async_trait]
impl LifecycleHandler for Invalidator {
    async fn on_lifecycle_event(&self, event: &LifecycleEvent) -> InvalidationReport {
        self.invalidate(event).await
    }
}

impl std::fmt::Debug for Invalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invalidator")
            .field("enabled", &self.enabled)
            .field("negative_cache", &self.negative_cache)
            .field("parent_refresh", &self.parent_refresh)
            .finish()
    }
}
