//! Tests de invalidacion: tombstones, padres embebidos, carreras con fills.

mod helpers;

use std::sync::Arc;

use async_trait::async_trait;
use helpers::*;
use idcache::idcache_backend::{MemoryBackend, StoreRequest};
use idcache::idcache_core::{Codec, JsonCodec};
use idcache::{
    CacheOperation, CachedValue, IdCacheConfig, InvalidationMode, InvalidationReport,
    LifecycleEvent, LifecycleHandler, ParentRefresh,
};
use parking_lot::Mutex;
use serde_json::json;

fn tombstone(key: &idcache::CacheKey) -> StoreRequest {
    let payload = JsonCodec.pack(&CachedValue::Deleted).unwrap();
    StoreRequest::set(key.as_str(), payload)
}

#[tokio::test]
async fn test_update_replaces_stale_entry() {
    let h = Harness::new();
    h.cache.fetch("Order", 42).await.unwrap();
    let key = h.cache.record_key("Order", 42).unwrap();

    h.loader
        .insert("Order", 42, json!({"id": 42, "customer_id": 9, "total": 1000}));
    let report = h.cache.dispatch(&LifecycleEvent::updated("Order", 42)).await;

    assert_eq!(report.expired, vec![key.to_string()]);
    assert_tombstone(h.backend.as_ref(), &key).await;

    let order = h.cache.fetch_required("Order", 42).await.unwrap();
    assert_eq!(order.parent()["total"], json!(1000));

    let cached = stored_value(h.backend.as_ref(), &key).await.unwrap();
    assert_eq!(cached.into_bundle().unwrap().parent()["total"], json!(1000));
}

#[tokio::test]
async fn test_destroy_leaves_tombstone_until_ttl() {
    let h = Harness::new();
    h.cache.fetch("Order", 44).await.unwrap();
    let key = h.cache.record_key("Order", 44).unwrap();

    h.loader.remove("Order", 44);
    h.cache.dispatch(&LifecycleEvent::destroyed("Order", 44)).await;

    assert!(h.cache.fetch("Order", 44).await.unwrap().is_none());
    assert_tombstone(h.backend.as_ref(), &key).await;
}

#[tokio::test]
async fn test_create_leaves_own_key_alone_without_negative_cache() {
    let h = Harness::new();

    let report = h.cache.dispatch(&LifecycleEvent::created("Order", 50)).await;

    assert!(report.expired.is_empty());
    assert_no_cache_operations(&h.events);
}

#[tokio::test]
async fn test_create_clears_negative_cache_marker() {
    let config = IdCacheConfig {
        negative_cache: true,
        ..Default::default()
    };
    let h = Harness::with_config(config);
    assert!(h.cache.fetch("Order", 50).await.unwrap().is_none());

    h.loader
        .insert("Order", 50, json!({"id": 50, "customer_id": 5, "total": 75}));
    let report = h.cache.dispatch(&LifecycleEvent::created("Order", 50)).await;

    assert_eq!(report.expired.len(), 1);
    let order = h.cache.fetch("Order", 50).await.unwrap().unwrap();
    assert_eq!(order.parent()["total"], json!(75));
}

#[tokio::test]
async fn test_child_update_expires_parent() {
    let h = Harness::new();
    h.cache.fetch("Order", 42).await.unwrap();
    let parent = h.cache.record_key("Order", 42).unwrap();

    h.loader
        .insert("Item", 2, json!({"id": 2, "order_id": 42, "sku": "B-2-v2"}));
    let event = LifecycleEvent::updated("Item", 2).with_parent_key(parent.clone());
    let report = h.cache.dispatch(&event).await;

    let item_key = h.cache.record_key("Item", 2).unwrap();
    assert_eq!(report.expired, vec![item_key.to_string(), parent.to_string()]);

    let order = h.cache.fetch_required("Order", 42).await.unwrap();
    assert_eq!(order.children("items").unwrap()[1]["sku"], json!("B-2-v2"));
}

#[tokio::test]
async fn test_child_update_rebuilds_parent_in_place() {
    let config = IdCacheConfig {
        parent_refresh: ParentRefresh::Rebuild,
        ..Default::default()
    };
    let h = Harness::with_config(config);
    h.cache.fetch("Order", 42).await.unwrap();
    let parent = h.cache.record_key("Order", 42).unwrap();

    h.loader
        .insert("Item", 3, json!({"id": 3, "order_id": 42, "sku": "C-3-v2"}));
    let event = LifecycleEvent::updated("Item", 3).with_parent_key(parent.clone());
    let report = h.cache.dispatch(&event).await;

    assert_eq!(report.refreshed, vec![parent.to_string()]);

    h.reset();
    let order = h.cache.fetch_required("Order", 42).await.unwrap();
    assert_eq!(order.children("items").unwrap()[2]["sku"], json!("C-3-v2"));
    assert_eq!(order.parent()["total"], json!(900));
    assert_queries(&h.events, 0);
}

#[tokio::test]
async fn test_rebuild_tombstones_uncached_parent() {
    let config = IdCacheConfig {
        parent_refresh: ParentRefresh::Rebuild,
        ..Default::default()
    };
    let h = Harness::with_config(config);
    let parent = h.cache.record_key("Order", 43).unwrap();

    let event = LifecycleEvent::updated("Item", 4).with_parent_key(parent.clone());
    let report = h.cache.dispatch(&event).await;

    assert!(report.refreshed.is_empty());
    assert!(report.expired.contains(&parent.to_string()));
    assert_tombstone(h.backend.as_ref(), &parent).await;
    assert_queries(&h.events, 0);
}

/// Un lector carga Order 42 con sus items [1, 2, 3] y queda pausado; mientras
/// tanto el item 4 pasa a Order 42 y se despacha la invalidacion. Retorna
/// cuantos items sirve el cache una vez que el lector termina.
async fn cached_items_after_reader_races_child_move(config: IdCacheConfig) -> usize {
    let (h, gated) = Harness::gated(config);
    let parent = h.cache.record_key("Order", 42).unwrap();
    let gate = gated.pause_next_association();

    let reader = h.cache.fetch("Order", 42);
    let writer = async {
        gate.reached().await;
        h.loader.link("Order", "items", "Item", 42, &[1, 2, 3, 4]);
        let event = LifecycleEvent::updated("Item", 4).with_parent_key(parent.clone());
        h.cache.dispatch(&event).await;
        gate.release();
    };
    let (read, ()) = tokio::join!(reader, writer);
    assert_eq!(read.unwrap().unwrap().children("items").unwrap().len(), 3);

    h.cache
        .fetch_required("Order", 42)
        .await
        .unwrap()
        .children("items")
        .unwrap()
        .len()
}

#[tokio::test]
async fn test_racing_reader_cannot_cache_stale_children_in_expire_mode() {
    let cached = cached_items_after_reader_races_child_move(IdCacheConfig::default()).await;
    assert_eq!(cached, 4);
}

#[tokio::test]
async fn test_racing_reader_cannot_cache_stale_children_in_rebuild_mode() {
    let config = IdCacheConfig {
        parent_refresh: ParentRefresh::Rebuild,
        ..Default::default()
    };
    let cached = cached_items_after_reader_races_child_move(config).await;
    assert_eq!(cached, 4);
}

#[tokio::test]
async fn test_delete_mode_lets_racing_reader_restore_old_children() {
    let config = IdCacheConfig {
        invalidation_mode: InvalidationMode::Delete,
        ..Default::default()
    };
    // Nothing is left behind for the reader's add to collide with.
    let cached = cached_items_after_reader_races_child_move(config).await;
    assert_eq!(cached, 3);
}

#[tokio::test]
async fn test_slow_rebuild_does_not_overwrite_newer_rebuild() {
    let config = IdCacheConfig {
        parent_refresh: ParentRefresh::Rebuild,
        ..Default::default()
    };
    let (h, gated) = Harness::gated(config);
    h.cache.fetch("Order", 42).await.unwrap();
    let parent = h.cache.record_key("Order", 42).unwrap();
    h.loader
        .insert("Item", 5, json!({"id": 5, "order_id": 42, "sku": "E-5"}));

    h.loader.link("Order", "items", "Item", 42, &[1, 2, 3, 4]);
    let first_event = LifecycleEvent::updated("Item", 4).with_parent_key(parent.clone());
    let gate = gated.pause_next_association();
    let slow = h.cache.dispatch(&first_event);
    let newer = async {
        gate.reached().await;
        h.loader.link("Order", "items", "Item", 42, &[1, 2, 3, 4, 5]);
        let event = LifecycleEvent::updated("Item", 5).with_parent_key(parent.clone());
        let report = h.cache.dispatch(&event).await;
        gate.release();
        report
    };
    let (slow, newer) = tokio::join!(slow, newer);

    assert_eq!(newer.refreshed, vec![parent.to_string()]);
    assert_eq!(slow.refreshed, vec![parent.to_string()]);

    h.reset();
    let order = h.cache.fetch_required("Order", 42).await.unwrap();
    let items = order.children("items").unwrap();
    assert_eq!(items.len(), 5);
    assert_eq!(items[4]["sku"], json!("E-5"));
    assert_queries(&h.events, 0);
}

#[tokio::test]
async fn test_rebuild_falls_back_to_expire_when_loader_fails() {
    let config = IdCacheConfig {
        parent_refresh: ParentRefresh::Rebuild,
        ..Default::default()
    };
    let h = Harness::with_config(config);
    h.cache.fetch("Order", 42).await.unwrap();
    let parent = h.cache.record_key("Order", 42).unwrap();

    h.loader.set_failing(true);
    let event = LifecycleEvent::updated("Item", 1).with_parent_key(parent.clone());
    let report = h.cache.dispatch(&event).await;

    assert!(report.expired.contains(&parent.to_string()));
    assert_tombstone(h.backend.as_ref(), &parent).await;
}

#[tokio::test]
async fn test_delete_mode_removes_keys() {
    let config = IdCacheConfig {
        invalidation_mode: InvalidationMode::Delete,
        ..Default::default()
    };
    let h = Harness::with_config(config);
    h.cache.fetch("Order", 42).await.unwrap();
    let key = h.cache.record_key("Order", 42).unwrap();
    h.reset();

    h.cache.dispatch(&LifecycleEvent::updated("Order", 42)).await;

    assert_cache_operations(&h.events, &[CacheOperation::Delete]);
    assert_eq!(stored_value(h.backend.as_ref(), &key).await, None);
}

#[tokio::test]
async fn test_fill_does_not_overwrite_concurrent_tombstone() {
    let backend = Arc::new(ContendedBackend::new());
    let h = Harness::with(IdCacheConfig::default(), backend.clone());
    let key = h.cache.record_key("Order", 42).unwrap();

    // The invalidation lands between the miss and the fill.
    backend.interleave(tombstone(&key));
    let order = h.cache.fetch("Order", 42).await.unwrap();

    assert!(order.is_some());
    assert_tombstone(h.backend.as_ref(), &key).await;

    // The next reader replaces the tombstone.
    h.cache.fetch("Order", 42).await.unwrap();
    let cached = stored_value(h.backend.as_ref(), &key).await.unwrap();
    assert!(cached.into_bundle().is_some());
}

#[tokio::test]
async fn test_fill_over_tombstone_loses_to_newer_tombstone() {
    let backend = Arc::new(ContendedBackend::new());
    let h = Harness::with(IdCacheConfig::default(), backend.clone());
    let key = h.cache.record_key("Order", 42).unwrap();
    h.cache.fetch("Order", 42).await.unwrap();
    h.cache.dispatch(&LifecycleEvent::updated("Order", 42)).await;

    // A second invalidation rewrites the tombstone after the reader saw the first.
    backend.interleave(tombstone(&key));
    h.cache.fetch("Order", 42).await.unwrap();

    assert_tombstone(h.backend.as_ref(), &key).await;
}

#[tokio::test]
async fn test_failed_invalidation_is_reported() {
    let h = Harness::with(IdCacheConfig::default(), Arc::new(FailingBackend));
    let key = h.cache.record_key("Order", 42).unwrap();

    let report = h.cache.dispatch(&LifecycleEvent::updated("Order", 42)).await;

    assert_eq!(report.failed, vec![key.to_string()]);
    assert_eq!(h.events.degraded(), vec!["invalidate"]);
}

struct AuditHandler {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl LifecycleHandler for AuditHandler {
    async fn on_lifecycle_event(&self, event: &LifecycleEvent) -> InvalidationReport {
        self.seen.lock().push(event.to_string());
        InvalidationReport::default()
    }
}

#[tokio::test]
async fn test_extra_handlers_run_after_invalidator() {
    let h = Harness::new();
    let audit = Arc::new(AuditHandler {
        seen: Mutex::new(Vec::new()),
    });
    h.cache.hooks().register(audit.clone());
    h.cache.fetch("Order", 42).await.unwrap();

    let report = h.cache.dispatch(&LifecycleEvent::updated("Order", 42)).await;

    assert_eq!(h.cache.hooks().len(), 2);
    assert_eq!(report.expired.len(), 1);
    assert_eq!(*audit.seen.lock(), vec!["Order 42 updated"]);
}

#[tokio::test]
async fn test_memory_backend_is_shared_between_caches() {
    let backend: Arc<MemoryBackend> = Arc::new(MemoryBackend::default());
    let writer = Harness::with(IdCacheConfig::default(), backend.clone());
    let reader = Harness::with(IdCacheConfig::default(), backend.clone());

    reader.cache.fetch("Order", 42).await.unwrap();
    reader
        .loader
        .insert("Order", 42, json!({"id": 42, "customer_id": 9, "total": 5}));
    writer.cache.dispatch(&LifecycleEvent::updated("Order", 42)).await;

    let order = reader.cache.fetch_required("Order", 42).await.unwrap();
    assert_eq!(order.parent()["total"], json!(5));
}
