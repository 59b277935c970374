//! Transport compression over any backend.

use std::collections::HashMap;

use async_trait::async_trait;
use idcache_core::CacheEntry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::request::{StoreOutcome, StoreRequest};
use crate::traits::CacheBackend;

const RAW: u8 = 0;
const LZ4: u8 = 1;

/// Compression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Payloads smaller than this are stored uncompressed.
    pub threshold_bytes: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: 512,
        }
    }
}

/// Wraps a backend and lz4-compresses payloads above a size threshold.
///
/// Every stored value gets a one-byte header telling whether it is
/// compressed. CAS tokens pass through untouched.
pub struct CompressedBackend<B> {
    inner: B,
    config: CompressionConfig,
    name: String,
}

impl<B: CacheBackend> CompressedBackend<B> {
    pub fn new(inner: B, config: CompressionConfig) -> Self {
        let name = format!("{}+lz4", inner.name());
        Self {
            inner,
            config,
            name,
        }
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn encode(&self, payload: Vec<u8>) -> Vec<u8> {
        if payload.len() < self.config.threshold_bytes {
            let mut out = Vec::with_capacity(payload.len() + 1);
            out.push(RAW);
            out.extend_from_slice(&payload);
            return out;
        }

        let compressed = lz4_flex::compress_prepend_size(&payload);
        debug!(
            original = payload.len(),
            compressed = compressed.len(),
            "compressed cache payload"
        );
        let mut out = Vec::with_capacity(compressed.len() + 1);
        out.push(LZ4);
        out.extend_from_slice(&compressed);
        out
    }

    /// Strips the header. Unreadable payloads are passed on unchanged so the
    /// codec rejects them and the engine reloads the entry.
    fn decode(&self, key: &str, stored: Vec<u8>) -> Vec<u8> {
        match stored.split_first() {
            Some((&RAW, rest)) => rest.to_vec(),
            Some((&LZ4, rest)) => match lz4_flex::decompress_size_prepended(rest) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to decompress cache payload");
                    stored
                },
            },
            _ => {
                warn!(key = %key, "cache payload without compression header");
                stored
            },
        }
    }
}

#[async_trait]
impl<B: CacheBackend> CacheBackend for CompressedBackend<B> {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, BackendError> {
        let entry = self.inner.get(key).await?;
        Ok(entry.map(|e| e.map_payload(|p| self.decode(key, p))))
    }

    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, CacheEntry>, BackendError> {
        let hits = self.inner.get_multi(keys).await?;
        Ok(hits
            .into_iter()
            .map(|(key, entry)| {
                let entry = entry.map_payload(|p| self.decode(&key, p));
                (key, entry)
            })
            .collect())
    }

    async fn set(&self, request: StoreRequest) -> Result<StoreOutcome, BackendError> {
        self.inner
            .set(request.map_value(|v| self.encode(v)))
            .await
    }

    async fn set_multi(&self, requests: Vec<StoreRequest>) -> Result<Vec<StoreOutcome>, BackendError> {
        let requests = requests
            .into_iter()
            .map(|r| r.map_value(|v| self.encode(v)))
            .collect();
        self.inner.set_multi(requests).await
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        self.inner.delete(key).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_cas(&self) -> bool {
        self.inner.supports_cas()
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        self.inner.health_check().await
    }

    async fn clear(&self) -> Result<(), BackendError> {
        self.inner.clear().await
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.inner.close().await
    }
}

impl<B> std::fmt::Debug for CompressedBackend<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedBackend")
            .field("name", &self.name)
            .field("threshold_bytes", &self.config.threshold_bytes)
            .finish()
    }
}
