//! The read path: fetch from the cache or fill from the loader.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use idcache_core::{
    CacheKey, CacheKeyBuilder, CachedValue, EmbeddedBundle, IdCacheError, RecordId, Result,
};
use tracing::{debug, warn};

use crate::adapter::{BackendAdapter, DecodedEntry, Fill, FillMode};
use crate::config::IdCacheConfig;
use crate::embedded::EmbeddedAssociationCache;

/// Result of looking at one cached entry.
enum Lookup {
    /// The entry answers the read.
    Hit(Option<EmbeddedBundle>),
    /// The record must be loaded, then written back as described.
    Reload(FillMode),
}

/// Fetches records through the cache.
///
/// Misses are loaded with their embedded associations and written back
/// without overwriting anything a concurrent invalidation wrote meanwhile.
/// Backend failures never reach the caller: the fetch falls back to the
/// loader and a `Degraded` event is emitted.
pub struct CacheFetcher {
    adapter: Arc<BackendAdapter>,
    embedded: Arc<EmbeddedAssociationCache>,
    keys: CacheKeyBuilder,
    enabled: bool,
    negative_cache: bool,
}

impl CacheFetcher {
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
            enabled: config.enabled,
            negative_cache: config.negative_cache,
        }
    }

    pub fn keys(&self) -> &CacheKeyBuilder {
        &self.keys
    }

    pub fn embedded(&self) -> &EmbeddedAssociationCache {
        &self.embedded
    }

    pub fn adapter(&self) -> &BackendAdapter {
        &self.adapter
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fetches one record with its embedded associations.
    ///
    /// `Ok(None)` means the record does not exist.
    ///
    /// # Errors
    ///
    /// `IdCacheError::UnknownEntity` for unregistered entities and
    /// `IdCacheError::Loader` when a miss cannot be loaded.
    pub async fn fetch_one(&self, entity: &str, id: &RecordId) -> Result<Option<EmbeddedBundle>> {
        let key = self.keys.record_key(entity, id)?;
        if !self.enabled {
            return self.embedded.build(entity, id).await;
        }

        let entry = match self.adapter.get(&key).await {
            Ok(entry) => entry,
            Err(e) => {
                self.adapter.bus().degraded("fetch_one", &e);
                return self.embedded.build(entity, id).await;
            },
        };

        match self.classify(&key, entry) {
            Lookup::Hit(bundle) => Ok(bundle),
            Lookup::Reload(mode) => {
                let bundle = self.embedded.build(entity, id).await?;
                if let Some(value) = self.fill_value(bundle.as_ref()) {
                    self.fill(vec![Fill { key, value, mode }]).await;
                }
                Ok(bundle)
            },
        }
    }

    /// Fetches many records, one result per requested id in request order.
    ///
    /// Duplicate ids get the same result. Costs at most one multi-get, one
    /// loader query per table, and one multi-set.
    pub async fn fetch_many(
        &self,
        entity: &str,
        ids: &[RecordId],
    ) -> Result<Vec<Option<EmbeddedBundle>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let unique = dedup(ids);
        let keys = self.keys.record_keys(entity, &unique)?;

        if !self.enabled {
            let built = self.embedded.build_many(entity, &unique).await?;
            return Ok(ids.iter().map(|id| built.get(id).cloned()).collect());
        }

        let mut hits = match self.adapter.get_multi(&keys).await {
            Ok(hits) => Some(hits),
            Err(e) => {
                self.adapter.bus().degraded("fetch_many", &e);
                None
            },
        };

        let mut resolved: HashMap<RecordId, Option<EmbeddedBundle>> =
            HashMap::with_capacity(unique.len());
        let mut misses: Vec<(RecordId, CacheKey, FillMode)> = Vec::new();

        for (id, key) in unique.into_iter().zip(keys) {
            let lookup = match hits.as_mut() {
                Some(hits) => {
                    let entry = hits.remove(key.as_str());
                    self.classify(&key, entry)
                },
                None => Lookup::Reload(FillMode::Skip),
            };
            match lookup {
                Lookup::Hit(bundle) => {
                    resolved.insert(id, bundle);
                },
                Lookup::Reload(mode) => misses.push((id, key, mode)),
            }
        }

        debug!(
            entity = %entity,
            requested = ids.len(),
            hits = resolved.len(),
            misses = misses.len(),
            "fetch_many"
        );

        if !misses.is_empty() {
            let miss_ids: Vec<RecordId> = misses.iter().map(|(id, _, _)| id.clone()).collect();
            let mut built = self.embedded.build_many(entity, &miss_ids).await?;

            let mut fills = Vec::with_capacity(misses.len());
            for (id, key, mode) in misses {
                let bundle = built.remove(&id);
                if let Some(value) = self.fill_value(bundle.as_ref()) {
                    fills.push(Fill { key, value, mode });
                }
                resolved.insert(id, bundle);
            }
            self.fill(fills).await;
        }

        Ok(ids
            .iter()
            .map(|id| resolved.get(id).cloned().flatten())
            .collect())
    }

    /// Like [`fetch_one`](Self::fetch_one), but absence is an error.
    ///
    /// # Errors
    ///
    /// `IdCacheError::NotFound` if the record does not exist.
    pub async fn fetch_required(&self, entity: &str, id: &RecordId) -> Result<EmbeddedBundle> {
        self.fetch_one(entity, id)
            .await?
            .ok_or_else(|| IdCacheError::not_found(entity, id.clone()))
    }

    fn classify(&self, key: &CacheKey, entry: Option<DecodedEntry>) -> Lookup {
        let mode = FillMode::after_read(entry.as_ref());
        let Some(entry) = entry else {
            return Lookup::Reload(mode);
        };

        match entry.value {
            Ok(CachedValue::Deleted) => Lookup::Reload(mode),
            // Creates only clear markers while negative caching is on.
            Ok(CachedValue::Missing) if self.negative_cache => Lookup::Hit(None),
            Ok(CachedValue::Missing) => Lookup::Reload(mode),
            Ok(value) => match EmbeddedAssociationCache::unpack(value) {
                Some(bundle) => Lookup::Hit(Some(bundle)),
                None => {
                    warn!(key = %key, "unexpected value under record key, reloading");
                    Lookup::Reload(mode)
                },
            },
            Err(e) => {
                warn!(key = %key, error = %e, "unreadable cache entry, reloading");
                Lookup::Reload(mode)
            },
        }
    }

    fn fill_value(&self, bundle: Option<&EmbeddedBundle>) -> Option<CachedValue> {
        match bundle {
            Some(bundle) => Some(EmbeddedAssociationCache::pack(bundle.clone())),
            None if self.negative_cache => Some(CachedValue::Missing),
            None => None,
        }
    }

    async fn fill(&self, fills: Vec<Fill>) {
        if let Err(e) = self.adapter.fill(fills).await {
            self.adapter.bus().degraded("fill", &e);
        }
    }
}

impl std::fmt::Debug for CacheFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheFetcher")
            .field("namespace", &self.keys.namespace())
            .field("enabled", &self.enabled)
            .field("negative_cache", &self.negative_cache)
            .finish()
    }
}

/// Removes duplicates, keeping first occurrences in order.
fn dedup(ids: &[RecordId]) -> Vec<RecordId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}
