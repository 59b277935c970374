//! Assertions personalizadas para tests.

use idcache::idcache_backend::CacheBackend;
use idcache::idcache_core::{CachedValue, Codec, JsonCodec};
use idcache::{CacheKey, CacheOperation};

use super::recorder::RecordingSubscriber;

/// Verifica el numero de queries emitidas al loader.
pub fn assert_queries(events: &RecordingSubscriber, expected: usize) {
    let queries = events.queries();
    assert_eq!(
        queries.len(),
        expected,
        "expected {} queries, got {:?}",
        expected,
        queries
    );
}

/// Verifica la secuencia exacta de operaciones de cache.
pub fn assert_cache_operations(events: &RecordingSubscriber, expected: &[CacheOperation]) {
    assert_eq!(events.cache_operations(), expected);
}

/// Verifica que no hubo ninguna operacion de cache.
pub fn assert_no_cache_operations(events: &RecordingSubscriber) {
    let operations = events.cache_operations();
    assert!(
        operations.is_empty(),
        "expected no cache operations, got {:?}",
        operations
    );
}

/// Lee y decodifica lo que hay guardado bajo una key.
pub async fn stored_value(backend: &dyn CacheBackend, key: &CacheKey) -> Option<CachedValue> {
    let entry = backend.get(key.as_str()).await.expect("backend reachable")?;
    Some(JsonCodec.unpack(entry.payload()).expect("decodable payload"))
}

/// Verifica que la key contiene una tombstone.
pub async fn assert_tombstone(backend: &dyn CacheBackend, key: &CacheKey) {
    let value = stored_value(backend, key).await;
    assert_eq!(value, Some(CachedValue::Deleted), "key {} is not a tombstone", key);
}
