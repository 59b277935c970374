//! In-process backend using Moka.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use idcache_core::{CacheEntry, CasToken};
use moka::Expiry;
use moka::sync::Cache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BackendError;
use crate::request::{StoreCondition, StoreOutcome, StoreRequest};
use crate::traits::CacheBackend;

/// Configuracion del backend en memoria.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryBackendConfig {
    /// Maximo numero de entries (default: 10000)
    pub max_capacity: u64,
    /// TTL en segundos para entries escritas sin TTL propio (default: none)
    pub ttl_seconds: Option<u64>,
    /// Whether entries carry CAS tokens (default: true)
    pub cas: bool,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl_seconds: None,
            cas: true,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    payload: Arc<[u8]>,
    token: u64,
    ttl: Option<Duration>,
}

/// Per-entry expiration: the request's TTL, else the configured default.
struct EntryExpiry {
    default_ttl: Option<Duration>,
}

impl Expiry<String, StoredValue> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl.or(self.default_ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl.or(self.default_ttl)
    }
}

/// Thread-safe in-process key-value store with CAS semantics.
///
/// Writes and deletes are serialized by a short lock so that a conditional
/// write observes the token it compares against; reads are lock-free.
/// Eviction is left to moka.
pub struct MemoryBackend {
    inner: Cache<String, StoredValue>,
    write_lock: Mutex<()>,
    next_token: AtomicU64,
    closed: AtomicBool,
    cas: bool,
}

impl MemoryBackend {
    /// Crea un nuevo backend con la configuracion dada.
    pub fn new(config: MemoryBackendConfig) -> Self {
        let inner = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(EntryExpiry {
                default_ttl: config.ttl_seconds.map(Duration::from_secs),
            })
            .build();

        Self {
            inner,
            write_lock: Mutex::new(()),
            next_token: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            cas: config.cas,
        }
    }

    /// Retorna el numero aproximado de entries.
    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    /// Returns true if a live entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::Closed);
        }
        Ok(())
    }

    fn to_entry(&self, value: &StoredValue) -> CacheEntry {
        let token = self.cas.then(|| CasToken::from_raw(value.token));
        CacheEntry::new(value.payload.to_vec(), token)
    }

    fn store(&self, request: StoreRequest) -> Result<StoreOutcome, BackendError> {
        let (key, value, condition, ttl) = request.into_parts();

        let _guard = self.write_lock.lock();
        match condition {
            StoreCondition::Always => {},
            StoreCondition::IfAbsent => {
                if self.inner.contains_key(&key) {
                    return Ok(StoreOutcome::Exists);
                }
            },
            StoreCondition::IfToken(token) => {
                if !self.cas {
                    return Err(BackendError::unsupported("memory", "cas"));
                }
                match self.inner.get(&key) {
                    None => return Ok(StoreOutcome::NotFound),
                    Some(current) if current.token != token.into_raw() => {
                        return Ok(StoreOutcome::Conflict);
                    },
                    Some(_) => {},
                }
            },
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.inner.insert(
            key,
            StoredValue {
                payload: value.into(),
                token,
                ttl,
            },
        );
        Ok(StoreOutcome::Stored)
    }

    fn remove(&self, key: &str) -> bool {
        let _guard = self.write_lock.lock();
        self.inner.remove(key).is_some()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(MemoryBackendConfig::default())
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, BackendError> {
        self.ensure_open()?;
        Ok(self.inner.get(key).map(|value| self.to_entry(&value)))
    }

    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, CacheEntry>, BackendError> {
        self.ensure_open()?;
        let hits: HashMap<String, CacheEntry> = keys
            .iter()
            .filter_map(|key| {
                self.inner
                    .get(key)
                    .map(|value| (key.clone(), self.to_entry(&value)))
            })
            .collect();

        debug!(requested = keys.len(), hits = hits.len(), "memory get_multi");
        Ok(hits)
    }

    async fn set(&self, request: StoreRequest) -> Result<StoreOutcome, BackendError> {
        self.ensure_open()?;
        self.store(request)
    }

    async fn set_multi(&self, requests: Vec<StoreRequest>) -> Result<Vec<StoreOutcome>, BackendError> {
        self.ensure_open()?;
        requests.into_iter().map(|request| self.store(request)).collect()
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        self.ensure_open()?;
        Ok(self.remove(key))
    }

    fn name(&self) -> &str {
        "memory"
    }

    fn supports_cas(&self) -> bool {
        self.cas
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        self.ensure_open()
    }

    async fn clear(&self) -> Result<(), BackendError> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();
        self.inner.invalidate_all();
        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entry_count", &self.inner.entry_count())
            .field("cas", &self.cas)
            .finish()
    }
}
