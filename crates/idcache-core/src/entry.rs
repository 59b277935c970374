//! Raw cache entries as exchanged with a backend.

use std::fmt;

/// Opaque version stamp assigned by the backend on every write.
///
/// A conditional write only succeeds if the entry still carries the token
/// that was returned by the read it is based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CasToken(u64);

impl CasToken {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn into_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A stored payload together with its CAS token.
///
/// The token is `None` when the backend does not support CAS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    payload: Vec<u8>,
    cas: Option<CasToken>,
}

impl CacheEntry {
    pub fn new(payload: Vec<u8>, cas: Option<CasToken>) -> Self {
        Self { payload, cas }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn cas(&self) -> Option<CasToken> {
        self.cas
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Returns the entry with its payload replaced, keeping the token.
    pub fn map_payload(self, f: impl FnOnce(Vec<u8>) -> Vec<u8>) -> Self {
        Self {
            payload: f(self.payload),
            cas: self.cas,
        }
    }
}
