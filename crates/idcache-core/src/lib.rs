//! idcache Core - Domain types
//!
//! This crate provides the foundational types of the idcache record cache:
//! identifiers, versioned cache keys, entity definitions, cached payloads,
//! lifecycle events and the error hierarchy.

pub mod codec;
pub mod entry;
pub mod error;
pub mod event;
pub mod id;
pub mod key;
pub mod model;
pub mod value;

pub use codec::{Codec, JsonCodec};
pub use entry::{CacheEntry, CasToken};
pub use error::{CodecError, IdCacheError, LoaderError, Result};
pub use event::{LifecycleEvent, LifecycleKind};
pub use id::{RecordId, ScalarValue};
pub use key::{CacheKey, CacheKeyBuilder, MAX_KEY_LENGTH};
pub use model::{
    AssociationDefinition, AssociationMode, EntityDefinition, EntityRegistry,
    EntityRegistryBuilder, IndexDefinition, PAYLOAD_FORMAT_VERSION,
};
pub use value::{CachedValue, EmbeddedBundle, Record};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
