//! Loader en memoria con una tienda de ejemplo.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use idcache::{LoaderError, Record, RecordId, RecordLoader};
use parking_lot::Mutex;
use serde_json::json;

type Key = (String, String);

struct Link {
    child_entity: String,
    children: HashMap<RecordId, Vec<RecordId>>,
}

/// Store of records, associations and indexes standing in for the database.
///
/// Every call is logged, so tests can count round-trips to the store.
#[derive(Default)]
pub struct ShopLoader {
    tables: Mutex<HashMap<String, BTreeMap<RecordId, Record>>>,
    links: Mutex<HashMap<Key, Link>>,
    indexes: Mutex<HashMap<Key, HashMap<RecordId, Vec<RecordId>>>>,
    calls: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl ShopLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders 42, 43 and 44, their items and tags, and the customer index.
    ///
    /// Order 42 has items 1, 2, 3 and tags 7, 8. Order 43 has item 4 and
    /// tag 8. Order 44 has nothing. Customer 9 placed 42 and 43, customer 5
    /// placed 44.
    pub fn seeded() -> Self {
        let loader = Self::new();

        for (id, customer, total) in [(42, 9, 900), (43, 9, 150), (44, 5, 10)] {
            loader.insert(
                "Order",
                id,
                json!({"id": id, "customer_id": customer, "total": total}),
            );
        }
        for (id, order, sku) in [(1, 42, "A-1"), (2, 42, "B-2"), (3, 42, "C-3"), (4, 43, "D-4")] {
            loader.insert("Item", id, json!({"id": id, "order_id": order, "sku": sku}));
        }
        loader.insert("Tag", 7, json!({"id": 7, "name": "gift"}));
        loader.insert("Tag", 8, json!({"id": 8, "name": "rush"}));

        loader.link("Order", "items", "Item", 42, &[1, 2, 3]);
        loader.link("Order", "items", "Item", 43, &[4]);
        loader.link("Order", "tags", "Tag", 42, &[7, 8]);
        loader.link("Order", "tags", "Tag", 43, &[8]);

        loader.set_index("Order", "by_customer", 9, &[42, 43]);
        loader.set_index("Order", "by_customer", 5, &[44]);

        loader
    }

    /// Inserts or replaces a row.
    pub fn insert(&self, entity: &str, id: impl Into<RecordId>, record: Record) {
        self.tables
            .lock()
            .entry(entity.to_string())
            .or_default()
            .insert(id.into(), record);
    }

    pub fn remove(&self, entity: &str, id: impl Into<RecordId>) {
        if let Some(table) = self.tables.lock().get_mut(entity) {
            table.remove(&id.into());
        }
    }

    /// Sets the children of one parent.
    pub fn link(
        &self,
        entity: &str,
        association: &str,
        child_entity: &str,
        parent_id: impl Into<RecordId>,
        child_ids: &[i64],
    ) {
        self.links
            .lock()
            .entry((entity.to_string(), association.to_string()))
            .or_insert_with(|| Link {
                child_entity: child_entity.to_string(),
                children: HashMap::new(),
            })
            .children
            .insert(
                parent_id.into(),
                child_ids.iter().copied().map(RecordId::from).collect(),
            );
    }

    pub fn set_index(
        &self,
        entity: &str,
        index: &str,
        values: impl Into<RecordId>,
        ids: &[i64],
    ) {
        self.indexes
            .lock()
            .entry((entity.to_string(), index.to_string()))
            .or_default()
            .insert(
                values.into(),
                ids.iter().copied().map(RecordId::from).collect(),
            );
    }

    /// Makes every following call fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    fn record_call(&self, entity: &str, call: String) -> Result<(), LoaderError> {
        self.calls.lock().push(call);
        if self.failing.load(Ordering::SeqCst) {
            return Err(LoaderError::new(
                entity,
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, "database went away"),
            ));
        }
        Ok(())
    }

    fn rows(&self, entity: &str, ids: &[RecordId]) -> HashMap<RecordId, Record> {
        let tables = self.tables.lock();
        let Some(table) = tables.get(entity) else {
            return HashMap::new();
        };
        ids.iter()
            .filter_map(|id| table.get(id).map(|row| (id.clone(), row.clone())))
            .collect()
    }

    fn child_ids(&self, entity: &str, association: &str, parent_id: &RecordId) -> Option<(String, Vec<RecordId>)> {
        let links = self.links.lock();
        let link = links.get(&(entity.to_string(), association.to_string()))?;
        let ids = link.children.get(parent_id).cloned().unwrap_or_default();
        Some((link.child_entity.clone(), ids))
    }

    fn children(&self, entity: &str, association: &str, parent_id: &RecordId) -> Vec<Record> {
        let Some((child_entity, ids)) = self.child_ids(entity, association, parent_id) else {
            return Vec::new();
        };
        let mut rows = self.rows(&child_entity, &ids);
        ids.iter().filter_map(|id| rows.remove(id)).collect()
    }
}

#[async_trait]
impl RecordLoader for ShopLoader {
    async fn load_many(
        &self,
        entity: &str,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, Record>, LoaderError> {
        self.record_call(entity, format!("load_many {} {}", entity, ids.len()))?;
        Ok(self.rows(entity, ids))
    }

    async fn load_association(
        &self,
        entity: &str,
        parent_id: &RecordId,
        association: &str,
    ) -> Result<Vec<Record>, LoaderError> {
        self.record_call(entity, format!("load_association {}.{}", entity, association))?;
        Ok(self.children(entity, association, parent_id))
    }

    async fn load_associations(
        &self,
        entity: &str,
        parent_ids: &[RecordId],
        association: &str,
    ) -> Result<HashMap<RecordId, Vec<Record>>, LoaderError> {
        self.record_call(
            entity,
            format!("load_associations {}.{} {}", entity, association, parent_ids.len()),
        )?;
        Ok(parent_ids
            .iter()
            .map(|id| (id.clone(), self.children(entity, association, id)))
            .collect())
    }

    async fn load_association_ids(
        &self,
        entity: &str,
        parent_ids: &[RecordId],
        association: &str,
    ) -> Result<HashMap<RecordId, Vec<RecordId>>, LoaderError> {
        self.record_call(
            entity,
            format!("load_association_ids {}.{} {}", entity, association, parent_ids.len()),
        )?;
        Ok(parent_ids
            .iter()
            .map(|id| {
                let ids = self
                    .child_ids(entity, association, id)
                    .map(|(_, ids)| ids)
                    .unwrap_or_default();
                (id.clone(), ids)
            })
            .collect())
    }

    async fn load_index(
        &self,
        entity: &str,
        index: &str,
        values: &RecordId,
    ) -> Result<Vec<RecordId>, LoaderError> {
        self.record_call(entity, format!("load_index {}.{}", entity, index))?;
        Ok(self
            .indexes
            .lock()
            .get(&(entity.to_string(), index.to_string()))
            .and_then(|index| index.get(values).cloned())
            .unwrap_or_default())
    }
}
