//! The data loader: access to the source of truth.

use std::collections::HashMap;

use async_trait::async_trait;
use idcache_core::{LoaderError, Record, RecordId};

/// Loads records and associations from the backing store.
///
/// Every method is one query against one table. The engine never retries
/// loader calls; errors are returned to the caller as
/// `IdCacheError::Loader` with the original error inside.
///
/// # Example
///
/// ```ignore
/// use idcache::RecordLoader;
///
/// struct SqlLoader { pool: PgPool }
///
/// #[async_trait]
/// impl RecordLoader for SqlLoader {
///     async fn load_many(&self, entity: &str, ids: &[RecordId])
///         -> Result<HashMap<RecordId, Record>, LoaderError>
///     {
///         // SELECT * FROM {entity} WHERE id IN (...)
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait RecordLoader: Send + Sync {
    /// Loads one record. `Ok(None)` means the record does not exist.
    async fn load_one(&self, entity: &str, id: &RecordId) -> Result<Option<Record>, LoaderError> {
        let mut found = self.load_many(entity, std::slice::from_ref(id)).await?;
        Ok(found.remove(id))
    }

    /// Loads many records in one query. Absent ids are missing from the map.
    async fn load_many(
        &self,
        entity: &str,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, Record>, LoaderError>;

    /// Loads the ordered children of one parent.
    async fn load_association(
        &self,
        entity: &str,
        parent_id: &RecordId,
        association: &str,
    ) -> Result<Vec<Record>, LoaderError>;

    /// Loads the children of many parents in one query.
    ///
    /// The default implementation issues one query per parent.
    async fn load_associations(
        &self,
        entity: &str,
        parent_ids: &[RecordId],
        association: &str,
    ) -> Result<HashMap<RecordId, Vec<Record>>, LoaderError> {
        let mut loaded = HashMap::with_capacity(parent_ids.len());
        for parent_id in parent_ids {
            let children = self.load_association(entity, parent_id, association).await?;
            loaded.insert(parent_id.clone(), children);
        }
        Ok(loaded)
    }

    /// Loads only the ordered child ids of an id-cached association.
    async fn load_association_ids(
        &self,
        entity: &str,
        parent_ids: &[RecordId],
        association: &str,
    ) -> Result<HashMap<RecordId, Vec<RecordId>>, LoaderError> {
        let _ = (parent_ids, association);
        Err(LoaderError::unsupported(entity, "load_association_ids"))
    }

    /// Resolves a secondary-index lookup to the matching ids.
    async fn load_index(
        &self,
        entity: &str,
        index: &str,
        values: &RecordId,
    ) -> Result<Vec<RecordId>, LoaderError> {
        let _ = (index, values);
        Err(LoaderError::unsupported(entity, "load_index"))
    }
}
