//! Write requests and their outcomes.

use std::time::Duration;

use idcache_core::CasToken;

/// Precondition attached to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCondition {
    /// Unconditional write.
    Always,
    /// Only store if the key holds nothing (memcached `add`).
    IfAbsent,
    /// Only store if the entry still carries this token (memcached `cas`).
    IfToken(CasToken),
}

/// A single write to the backend.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use idcache_backend::{StoreCondition, StoreRequest};
///
/// let req = StoreRequest::add("IDC:Order:abc:i1", b"{}".to_vec())
///     .with_ttl(Duration::from_secs(60));
/// assert_eq!(req.condition(), StoreCondition::IfAbsent);
/// assert_eq!(req.ttl(), Some(Duration::from_secs(60)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRequest {
    key: String,
    value: Vec<u8>,
    condition: StoreCondition,
    ttl: Option<Duration>,
}

impl StoreRequest {
    /// Unconditional write.
    pub fn set(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self::with_condition(key, value, StoreCondition::Always)
    }

    /// Write that only succeeds if the key is absent.
    pub fn add(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self::with_condition(key, value, StoreCondition::IfAbsent)
    }

    /// Write that only succeeds if the entry still carries `token`.
    pub fn cas(key: impl Into<String>, value: Vec<u8>, token: CasToken) -> Self {
        Self::with_condition(key, value, StoreCondition::IfToken(token))
    }

    pub fn with_condition(key: impl Into<String>, value: Vec<u8>, condition: StoreCondition) -> Self {
        Self {
            key: key.into(),
            value,
            condition,
            ttl: None,
        }
    }

    /// Sets the entry's time-to-live.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the entry's time-to-live if one is given.
    #[must_use]
    pub fn with_optional_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn condition(&self) -> StoreCondition {
        self.condition
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Returns the request with its value replaced.
    pub fn map_value(self, f: impl FnOnce(Vec<u8>) -> Vec<u8>) -> Self {
        Self {
            value: f(self.value),
            ..self
        }
    }

    pub fn into_parts(self) -> (String, Vec<u8>, StoreCondition, Option<Duration>) {
        (self.key, self.value, self.condition, self.ttl)
    }
}

/// Result of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The value was written.
    Stored,
    /// `IfAbsent` write found an existing entry.
    Exists,
    /// `IfToken` write found a different token.
    Conflict,
    /// `IfToken` write found no entry at all.
    NotFound,
}

impl StoreOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Exists => "exists",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
        }
    }
}
