//! Loader que puede pausar una carga de asociacion a mitad de camino.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use idcache::{LoaderError, Record, RecordId, RecordLoader};
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::loader::ShopLoader;

/// One armed pause: the call signals `reached` after reading its rows and
/// waits for `release`.
#[derive(Clone, Default)]
pub struct Gate {
    reached: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    /// Waits until the paused call has read its rows.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Lets the paused call return.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Wraps a [`ShopLoader`]; `load_association` can be held open after it has
/// read the database, to interleave a commit and its invalidation.
pub struct GatedLoader {
    inner: Arc<ShopLoader>,
    armed: Mutex<Option<Gate>>,
}

impl GatedLoader {
    pub fn new(inner: Arc<ShopLoader>) -> Self {
        Self {
            inner,
            armed: Mutex::new(None),
        }
    }

    /// Pauses the next `load_association` call, and only that one.
    pub fn pause_next_association(&self) -> Gate {
        let gate = Gate::default();
        *self.armed.lock() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl RecordLoader for GatedLoader {
    async fn load_many(
        &self,
        entity: &str,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, Record>, LoaderError> {
        self.inner.load_many(entity, ids).await
    }

    async fn load_association(
        &self,
        entity: &str,
        parent_id: &RecordId,
        association: &str,
    ) -> Result<Vec<Record>, LoaderError> {
        let rows = self
            .inner
            .load_association(entity, parent_id, association)
            .await;
        let gate = self.armed.lock().take();
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
        rows
    }

    async fn load_associations(
        &self,
        entity: &str,
        parent_ids: &[RecordId],
        association: &str,
    ) -> Result<HashMap<RecordId, Vec<Record>>, LoaderError> {
        self.inner
            .load_associations(entity, parent_ids, association)
            .await
    }

    async fn load_association_ids(
        &self,
        entity: &str,
        parent_ids: &[RecordId],
        association: &str,
    ) -> Result<HashMap<RecordId, Vec<RecordId>>, LoaderError> {
        self.inner
            .load_association_ids(entity, parent_ids, association)
            .await
    }

    async fn load_index(
        &self,
        entity: &str,
        index: &str,
        values: &RecordId,
    ) -> Result<Vec<RecordId>, LoaderError> {
        self.inner.load_index(entity, index, values).await
    }
}
