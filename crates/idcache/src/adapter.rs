//! Uniform, instrumented access to the cache backend.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use idcache_backend::{BackendError, CacheBackend, StoreCondition, StoreOutcome, StoreRequest};
use idcache_core::{CacheEntry, CacheKey, CachedValue, CasToken, Codec, CodecError};
use tracing::debug;

use crate::config::{IdCacheConfig, InvalidationMode};
use crate::instrumentation::{CacheOperation, CacheOutcome, InstrumentEvent, InstrumentationBus};

/// An entry read from the backend, decoded.
#[derive(Debug, Clone)]
pub struct DecodedEntry {
    /// The decoded value, or why the payload could not be read.
    pub value: Result<CachedValue, CodecError>,
    pub cas: Option<CasToken>,
}

/// How a freshly loaded value may be written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// The key held nothing: store only if it still holds nothing.
    Add,
    /// The key held a tombstone or junk: replace it only if untouched since.
    Replace(CasToken),
    /// Do not write.
    Skip,
}

impl FillMode {
    /// Decides how to fill after a read of `entry`.
    ///
    /// A stale entry without a CAS token is left alone; its tombstone TTL
    /// clears it.
    pub fn after_read(entry: Option<&DecodedEntry>) -> Self {
        match entry {
            None => Self::Add,
            Some(entry) => entry.cas.map_or(Self::Skip, Self::Replace),
        }
    }

    fn condition(self) -> Option<StoreCondition> {
        match self {
            Self::Add => Some(StoreCondition::IfAbsent),
            Self::Replace(token) => Some(StoreCondition::IfToken(token)),
            Self::Skip => None,
        }
    }
}

/// A pending fill of one key.
#[derive(Debug, Clone)]
pub struct Fill {
    pub key: CacheKey,
    pub value: CachedValue,
    pub mode: FillMode,
}

/// Wraps a [`CacheBackend`] with the codec, a per-call timeout and
/// instrumentation.
///
/// Every backend call emits exactly one `Cache` event, including failed ones.
pub struct BackendAdapter {
    backend: Arc<dyn CacheBackend>,
    codec: Arc<dyn Codec>,
    bus: InstrumentationBus,
    timeout: Duration,
    invalidation_mode: InvalidationMode,
    tombstone_ttl: Duration,
    entry_ttl: Option<Duration>,
}

impl BackendAdapter {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        codec: Arc<dyn Codec>,
        bus: InstrumentationBus,
        config: &IdCacheConfig,
    ) -> Self {
        Self {
            backend,
            codec,
            bus,
            timeout: config.operation_timeout(),
            invalidation_mode: config.invalidation_mode,
            tombstone_ttl: config.tombstone_ttl(),
            entry_ttl: config.entry_ttl(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub fn bus(&self) -> &InstrumentationBus {
        &self.bus
    }

    pub fn supports_cas(&self) -> bool {
        self.backend.supports_cas()
    }

    /// Reads one key.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<DecodedEntry>, BackendError> {
        let keys = vec![key.as_str().to_string()];
        let result = self
            .instrumented(
                CacheOperation::Read,
                keys,
                self.backend.get(key.as_str()),
                |entry: &Option<CacheEntry>| CacheOutcome::Read {
                    hits: usize::from(entry.is_some()),
                },
            )
            .await?;

        Ok(result.map(|entry| self.decode(key, entry)))
    }

    /// Reads many keys in one round-trip. The map is keyed by rendered key
    /// and holds hits only.
    pub async fn get_multi(
        &self,
        keys: &[CacheKey],
    ) -> Result<HashMap<String, DecodedEntry>, BackendError> {
        let rendered: Vec<String> = keys.iter().map(|k| k.as_str().to_string()).collect();
        let hits = self
            .instrumented(
                CacheOperation::ReadMulti,
                rendered.clone(),
                self.backend.get_multi(&rendered),
                |hits: &HashMap<String, CacheEntry>| CacheOutcome::Read { hits: hits.len() },
            )
            .await?;

        Ok(keys
            .iter()
            .filter_map(|key| {
                hits.get(key.as_str())
                    .map(|entry| (key.as_str().to_string(), self.decode(key, entry.clone())))
            })
            .collect())
    }

    /// Writes one value under the given condition.
    pub async fn set(
        &self,
        key: &CacheKey,
        value: &CachedValue,
        condition: StoreCondition,
        ttl: Option<Duration>,
    ) -> Result<StoreOutcome, BackendError> {
        let request = self.request(key, value, condition, ttl)?;
        self.instrumented(
            CacheOperation::Write,
            vec![key.as_str().to_string()],
            self.backend.set(request),
            |outcome: &StoreOutcome| CacheOutcome::Written {
                stored: usize::from(outcome.is_stored()),
            },
        )
        .await
    }

    /// Writes many values in one round-trip, outcomes in input order.
    pub async fn set_multi(
        &self,
        writes: Vec<(CacheKey, CachedValue, StoreCondition, Option<Duration>)>,
    ) -> Result<Vec<StoreOutcome>, BackendError> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::with_capacity(writes.len());
        let mut requests = Vec::with_capacity(writes.len());
        for (key, value, condition, ttl) in &writes {
            keys.push(key.as_str().to_string());
            requests.push(self.request(key, value, *condition, *ttl)?);
        }

        self.instrumented(
            CacheOperation::WriteMulti,
            keys,
            self.backend.set_multi(requests),
            |outcomes: &Vec<StoreOutcome>| CacheOutcome::Written {
                stored: outcomes.iter().filter(|o| o.is_stored()).count(),
            },
        )
        .await
    }

    /// Removes a key.
    pub async fn delete(&self, key: &CacheKey) -> Result<bool, BackendError> {
        self.instrumented(
            CacheOperation::Delete,
            vec![key.as_str().to_string()],
            self.backend.delete(key.as_str()),
            |existed: &bool| CacheOutcome::Deleted { existed: *existed },
        )
        .await
    }

    /// Conditional write of a value with the CAS token read earlier.
    pub async fn cas(
        &self,
        key: &CacheKey,
        value: &CachedValue,
        token: CasToken,
    ) -> Result<StoreOutcome, BackendError> {
        self.set(key, value, StoreCondition::IfToken(token), self.entry_ttl)
            .await
    }

    /// Makes the key unusable: a tombstone or a delete, per configuration.
    pub async fn expire(&self, key: &CacheKey) -> Result<(), BackendError> {
        match self.invalidation_mode {
            InvalidationMode::Tombstone => {
                self.set(
                    key,
                    &CachedValue::Deleted,
                    StoreCondition::Always,
                    Some(self.tombstone_ttl),
                )
                .await?;
            },
            InvalidationMode::Delete => {
                self.delete(key).await?;
            },
        }
        debug!(key = %key, "cache key expired");
        Ok(())
    }

    /// Writes loaded values back in one round-trip, dropping skipped ones.
    ///
    /// Returns the number of values stored. A fill that finds the key changed
    /// since it was read is dropped.
    pub async fn fill(&self, fills: Vec<Fill>) -> Result<usize, BackendError> {
        let writes: Vec<_> = fills
            .into_iter()
            .filter_map(|fill| {
                fill.mode
                    .condition()
                    .map(|condition| (fill.key, fill.value, condition, self.entry_ttl))
            })
            .collect();

        let outcomes = match writes.len() {
            0 => return Ok(0),
            1 => {
                let (key, value, condition, ttl) = &writes[0];
                vec![self.set(key, value, *condition, *ttl).await?]
            },
            _ => self.set_multi(writes).await?,
        };

        let stored = outcomes.iter().filter(|o| o.is_stored()).count();
        if stored < outcomes.len() {
            debug!(
                dropped = outcomes.len() - stored,
                "cache fill lost race with a concurrent writer"
            );
        }
        Ok(stored)
    }

    fn request(
        &self,
        key: &CacheKey,
        value: &CachedValue,
        condition: StoreCondition,
        ttl: Option<Duration>,
    ) -> Result<StoreRequest, BackendError> {
        let payload = self
            .codec
            .pack(value)
            .map_err(|e| BackendError::protocol(format!("{}: {}", key, e)))?;
        Ok(StoreRequest::with_condition(key.as_str(), payload, condition).with_optional_ttl(ttl))
    }

    fn decode(&self, key: &CacheKey, entry: CacheEntry) -> DecodedEntry {
        let cas = entry.cas();
        let value = self.codec.unpack(entry.payload());
        if let Err(e) = &value {
            debug!(key = %key, error = %e, "unreadable cache payload");
        }
        DecodedEntry { value, cas }
    }

    /// Runs one backend call under the timeout and emits its event.
    async fn instrumented<T, F>(
        &self,
        operation: CacheOperation,
        keys: Vec<String>,
        call: F,
        outcome: impl FnOnce(&T) -> CacheOutcome,
    ) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                millis: self.timeout.as_millis() as u64,
            }),
        };

        let outcome = match &result {
            Ok(value) => outcome(value),
            Err(e) => CacheOutcome::Failed {
                reason: e.to_string(),
            },
        };
        self.bus.emit(InstrumentEvent::Cache {
            operation,
            keys,
            outcome,
            duration: start.elapsed(),
        });

        result
    }
}

impl std::fmt::Debug for BackendAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendAdapter")
            .field("backend", &self.backend.name())
            .field("timeout", &self.timeout)
            .field("invalidation_mode", &self.invalidation_mode)
            .finish()
    }
}
