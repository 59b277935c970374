//! # IdCache Backend
//!
//! Key-value store abstraction for the identity cache.
//!
//! This crate defines the [`CacheBackend`] trait the engine talks to and ships
//! an in-process implementation plus a compression wrapper.
//!
//! ## Features
//!
//! - Async trait-based backend abstraction with batched reads and writes
//! - Conditional writes: memcached-style `add` and `cas`
//! - Moka-backed in-process store with per-entry TTL
//! - Transparent lz4 compression over any backend
//!
//! ## Example
//!
//! ```ignore
//! use idcache_backend::{
//!     CacheBackend, CompressedBackend, CompressionConfig, MemoryBackend, StoreRequest,
//! };
//!
//! let backend = CompressedBackend::new(MemoryBackend::default(), CompressionConfig::default());
//! backend.set(StoreRequest::add("IDC:Order:ab12:i42", payload)).await?;
//!
//! let entry = backend.get("IDC:Order:ab12:i42").await?;
//! ```

pub mod compressed;
pub mod error;
pub mod memory;
pub mod request;
pub mod traits;

// Re-exports
pub use compressed::{CompressedBackend, CompressionConfig};
pub use error::BackendError;
pub use memory::{MemoryBackend, MemoryBackendConfig};
pub use request::{StoreCondition, StoreOutcome, StoreRequest};
pub use traits::CacheBackend;

// Re-export idcache_core for consumers
pub use idcache_core;
