//! Backends con fallos y carreras inyectadas.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use idcache::idcache_backend::{
    BackendError, CacheBackend, MemoryBackend, StoreOutcome, StoreRequest,
};
use idcache::idcache_core::CacheEntry;
use parking_lot::Mutex;

/// Memory backend that lets a concurrent writer land right after a read.
///
/// Every `get` pops one queued write and applies it after the read
/// completed, so the caller holds a stale CAS token.
#[derive(Default)]
pub struct ContendedBackend {
    inner: MemoryBackend,
    interleaved: Mutex<VecDeque<StoreRequest>>,
}

impl ContendedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a write that lands after the next read.
    pub fn interleave(&self, request: StoreRequest) {
        self.interleaved.lock().push_back(request);
    }

    /// Number of queued writes not applied yet.
    pub fn pending(&self) -> usize {
        self.interleaved.lock().len()
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    async fn land_next(&self) -> Result<(), BackendError> {
        let next = self.interleaved.lock().pop_front();
        if let Some(request) = next {
            self.inner.set(request).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for ContendedBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, BackendError> {
        let entry = self.inner.get(key).await?;
        self.land_next().await?;
        Ok(entry)
    }

    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, CacheEntry>, BackendError> {
        let entries = self.inner.get_multi(keys).await?;
        self.land_next().await?;
        Ok(entries)
    }

    async fn set(&self, request: StoreRequest) -> Result<StoreOutcome, BackendError> {
        self.inner.set(request).await
    }

    async fn set_multi(&self, requests: Vec<StoreRequest>) -> Result<Vec<StoreOutcome>, BackendError> {
        self.inner.set_multi(requests).await
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        self.inner.delete(key).await
    }

    fn name(&self) -> &str {
        "contended"
    }
}

/// Backend whose every call fails as if the server were down.
#[derive(Debug, Default)]
pub struct FailingBackend;

#[async_trait]
impl CacheBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, BackendError> {
        Err(BackendError::unavailable("connection refused"))
    }

    async fn get_multi(&self, _keys: &[String]) -> Result<HashMap<String, CacheEntry>, BackendError> {
        Err(BackendError::unavailable("connection refused"))
    }

    async fn set(&self, _request: StoreRequest) -> Result<StoreOutcome, BackendError> {
        Err(BackendError::unavailable("connection refused"))
    }

    async fn delete(&self, _key: &str) -> Result<bool, BackendError> {
        Err(BackendError::unavailable("connection refused"))
    }

    fn name(&self) -> &str {
        "failing"
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        Err(BackendError::unavailable("connection refused"))
    }
}

/// Backend that never answers within any sane timeout.
#[derive(Debug)]
pub struct SlowBackend {
    delay: Duration,
}

impl SlowBackend {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl CacheBackend for SlowBackend {
    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, BackendError> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }

    async fn get_multi(&self, _keys: &[String]) -> Result<HashMap<String, CacheEntry>, BackendError> {
        tokio::time::sleep(self.delay).await;
        Ok(HashMap::new())
    }

    async fn set(&self, _request: StoreRequest) -> Result<StoreOutcome, BackendError> {
        tokio::time::sleep(self.delay).await;
        Ok(StoreOutcome::Stored)
    }

    async fn delete(&self, _key: &str) -> Result<bool, BackendError> {
        tokio::time::sleep(self.delay).await;
        Ok(false)
    }

    fn name(&self) -> &str {
        "slow"
    }
}
