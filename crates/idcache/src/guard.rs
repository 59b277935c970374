//! CAS-protected read-modify-write of cached values.

use std::fmt;
use std::sync::Arc;

use idcache_backend::StoreOutcome;
use idcache_core::{CacheKey, CachedValue};
use tracing::{debug, warn};

use crate::adapter::BackendAdapter;

/// How a guarded update ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// The new value was written.
    Updated { attempts: u32 },
    /// Nothing usable was cached; nothing to update.
    Missing,
    /// The update could not be applied and the key was expired instead.
    Expired { attempts: u32 },
    /// The backend failed; the key may still hold the old value until its
    /// TTL runs out.
    Degraded,
}

impl GuardOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }
}

impl fmt::Display for GuardOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Updated { attempts } => write!(f, "updated after {} attempt(s)", attempts),
            Self::Missing => f.write_str("missing"),
            Self::Expired { attempts } => write!(f, "expired after {} attempt(s)", attempts),
            Self::Degraded => f.write_str("degraded"),
        }
    }
}

/// Applies updates to cached values without losing concurrent writes.
///
/// Each attempt reads the entry with its CAS token, transforms it and writes
/// it back only if the token is unchanged. After `max_retries` conflicting
/// retries the key is expired so the next read reloads it.
#[derive(Debug, Clone)]
pub struct ConsistencyGuard {
    adapter: Arc<BackendAdapter>,
    max_retries: u32,
}

impl ConsistencyGuard {
    pub fn new(adapter: Arc<BackendAdapter>, max_retries: u32) -> Self {
        Self {
            adapter,
            max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Updates the value under `key`.
    ///
    /// `transform` receives the current value and returns the replacement,
    /// or `None` if it cannot be applied. It may run once per attempt.
    pub async fn update<F>(&self, key: &CacheKey, mut transform: F) -> GuardOutcome
    where
        F: FnMut(CachedValue) -> Option<CachedValue> + Send,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;

            let entry = match self.adapter.get(key).await {
                Ok(Some(entry)) => entry,
                Ok(None) => return GuardOutcome::Missing,
                Err(e) => {
                    self.adapter.bus().degraded("guard_read", &e);
                    return self.expire_after_failure(key).await;
                },
            };

            let current = match entry.value {
                Ok(value) if value.is_tombstone() => return GuardOutcome::Missing,
                Ok(value) => value,
                Err(e) => {
                    warn!(key = %key, error = %e, "unreadable cache entry, expiring");
                    return self.give_up(key, attempts).await;
                },
            };

            let Some(token) = entry.cas else {
                debug!(key = %key, "backend has no CAS tokens, expiring");
                return self.give_up(key, attempts).await;
            };

            let Some(next) = transform(current) else {
                debug!(key = %key, "update not applicable, expiring");
                return self.give_up(key, attempts).await;
            };

            match self.adapter.cas(key, &next, token).await {
                Ok(StoreOutcome::Stored) => {
                    debug!(key = %key, attempts, "cache entry updated");
                    return GuardOutcome::Updated { attempts };
                },
                Ok(StoreOutcome::NotFound) => return GuardOutcome::Missing,
                Ok(StoreOutcome::Conflict | StoreOutcome::Exists) => {
                    if attempts > self.max_retries {
                        warn!(key = %key, attempts, "CAS retries exhausted, expiring");
                        return self.give_up(key, attempts).await;
                    }
                    debug!(key = %key, attempts, "CAS conflict, retrying");
                },
                Err(e) => {
                    self.adapter.bus().degraded("guard_write", &e);
                    return self.expire_after_failure(key).await;
                },
            }
        }
    }

    async fn give_up(&self, key: &CacheKey, attempts: u32) -> GuardOutcome {
        match self.adapter.expire(key).await {
            Ok(()) => GuardOutcome::Expired { attempts },
            Err(e) => {
                self.adapter.bus().degraded("guard_expire", &e);
                GuardOutcome::Degraded
            },
        }
    }

    /// Best-effort expire after a transport failure.
    async fn expire_after_failure(&self, key: &CacheKey) -> GuardOutcome {
        if let Err(e) = self.adapter.expire(key).await {
            debug!(key = %key, error = %e, "expire after failure also failed");
        }
        GuardOutcome::Degraded
    }
}
