//! Cached secondary-index lookups.

use std::sync::Arc;

use idcache_core::{CacheKey, CachedValue, EmbeddedBundle, RecordId, Result};
use tracing::warn;

use crate::adapter::{Fill, FillMode};
use crate::fetcher::CacheFetcher;

/// Caches the ids behind `WHERE field = value` lookups.
///
/// The id list lives under its own index key; the records themselves are
/// resolved through the fetcher, so they share the record keys and their
/// invalidation.
#[derive(Debug, Clone)]
pub struct IndexCache {
    fetcher: Arc<CacheFetcher>,
}

impl IndexCache {
    pub fn new(fetcher: Arc<CacheFetcher>) -> Self {
        Self { fetcher }
    }

    /// Returns the records matching an index lookup, in the order the loader
    /// returned their ids. Records that vanished since are skipped.
    ///
    /// # Errors
    ///
    /// `IdCacheError::UnknownIndex` if the index is not declared on the
    /// entity, `IdCacheError::Loader` when the lookup or a record load fails.
    pub async fn fetch_by_index(
        &self,
        entity: &str,
        index: &str,
        values: &RecordId,
    ) -> Result<Vec<EmbeddedBundle>> {
        let key = self.fetcher.keys().index_key(entity, index, values)?;
        let ids = self.lookup(&key, entity, index, values).await?;

        let records = self.fetcher.fetch_many(entity, &ids).await?;
        Ok(records.into_iter().flatten().collect())
    }

    async fn lookup(
        &self,
        key: &CacheKey,
        entity: &str,
        index: &str,
        values: &RecordId,
    ) -> Result<Vec<RecordId>> {
        if !self.fetcher.is_enabled() {
            return self.load(entity, index, values).await;
        }

        let adapter = self.fetcher.adapter();
        let mode = match adapter.get(key).await {
            Ok(None) => FillMode::Add,
            Ok(Some(entry)) => {
                let mode = FillMode::after_read(Some(&entry));
                match entry.value {
                    Ok(CachedValue::Ids(ids)) => return Ok(ids),
                    Ok(CachedValue::Deleted) => mode,
                    Ok(_) => {
                        warn!(key = %key, "unexpected value under index key, reloading");
                        mode
                    },
                    Err(e) => {
                        warn!(key = %key, error = %e, "unreadable index entry, reloading");
                        mode
                    },
                }
            },
            Err(e) => {
                adapter.bus().degraded("fetch_by_index", &e);
                FillMode::Skip
            },
        };

        let ids = self.load(entity, index, values).await?;
        let fill = Fill {
            key: key.clone(),
            value: CachedValue::Ids(ids.clone()),
            mode,
        };
        if let Err(e) = adapter.fill(vec![fill]).await {
            adapter.bus().degraded("fill", &e);
        }
        Ok(ids)
    }

    async fn load(&self, entity: &str, index: &str, values: &RecordId) -> Result<Vec<RecordId>> {
        let embedded = self.fetcher.embedded();
        embedded.bus().query(entity, format!("load_index({})", index));
        Ok(embedded.loader().load_index(entity, index, values).await?)
    }
}
