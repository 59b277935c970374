//! Packing of cached values into backend payloads.

use crate::error::CodecError;
use crate::value::CachedValue;

/// Converts cached values to and from the bytes stored in the backend.
pub trait Codec: Send + Sync {
    fn pack(&self, value: &CachedValue) -> Result<Vec<u8>, CodecError>;

    fn unpack(&self, payload: &[u8]) -> Result<CachedValue, CodecError>;
}

/// JSON payloads via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn pack(&self, value: &CachedValue) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn unpack(&self, payload: &[u8]) -> Result<CachedValue, CodecError> {
        serde_json::from_slice(payload).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
