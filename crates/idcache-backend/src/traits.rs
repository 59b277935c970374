//! Cache backend trait definition.

use std::collections::HashMap;

use async_trait::async_trait;
use idcache_core::CacheEntry;

use crate::error::BackendError;
use crate::request::{StoreOutcome, StoreRequest};

/// A distributed key-value store holding cache entries.
///
/// Keys are opaque strings and values opaque bytes. Implementations that
/// support compare-and-swap return a token with every entry and honour
/// [`StoreCondition::IfToken`](crate::StoreCondition::IfToken).
///
/// # Implementors
///
/// - `MemoryBackend` - in-process store backed by moka
/// - `CompressedBackend` - lz4 compression over any other backend
///
/// # Example
///
/// ```ignore
/// use idcache_backend::{CacheBackend, MemoryBackend, StoreRequest};
///
/// let backend = MemoryBackend::default();
/// backend.set(StoreRequest::set("k", b"v".to_vec())).await?;
/// let entry = backend.get("k").await?.expect("hit");
/// assert_eq!(entry.payload(), b"v");
/// ```
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Reads one entry. `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, BackendError>;

    /// Reads many entries in one round-trip. Misses are absent from the map.
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, CacheEntry>, BackendError>;

    /// Writes one entry, honouring the request's condition.
    async fn set(&self, request: StoreRequest) -> Result<StoreOutcome, BackendError>;

    /// Writes many entries in one round-trip.
    ///
    /// Outcomes are returned in request order. The default implementation
    /// issues the writes one by one for stores without a batch command.
    async fn set_multi(&self, requests: Vec<StoreRequest>) -> Result<Vec<StoreOutcome>, BackendError> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            outcomes.push(self.set(request).await?);
        }
        Ok(outcomes)
    }

    /// Removes an entry. Returns false if there was nothing to remove.
    async fn delete(&self, key: &str) -> Result<bool, BackendError>;

    /// Returns the name of this backend, for logs and events.
    fn name(&self) -> &str;

    /// Returns whether entries carry CAS tokens.
    fn supports_cas(&self) -> bool {
        true
    }

    /// Verifies that the backend is reachable.
    async fn health_check(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Removes every entry. Intended for tests and maintenance.
    async fn clear(&self) -> Result<(), BackendError> {
        Err(BackendError::unsupported(self.name(), "clear"))
    }

    /// Releases connections. Further calls fail with `BackendError::Closed`.
    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
