//! Error types for idcache.
//!
//! Cache-side failures (transport errors, CAS conflicts, unreadable payloads)
//! are recovered inside the engine and never reach the application. The only
//! errors a caller sees are the ones defined here: data-loader failures,
//! carried unchanged, and misuse of the entity registry.
//!
//! # Example
//!
//! ```
//! use idcache_core::{IdCacheError, LoaderError, RecordId};
//!
//! let err = IdCacheError::not_found("Order", RecordId::from(42));
//! assert!(err.is_not_found());
//!
//! let io = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
//! let err: IdCacheError = LoaderError::new("Order", io).into();
//! assert!(err.is_loader_error());
//! ```

use std::error::Error as StdError;

use thiserror::Error;

use crate::RecordId;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Error raised by a data loader (the database layer).
///
/// The engine never retries or rewrites these: the original error is kept as
/// the `source` so callers can downcast it back to their own type.
#[derive(Debug, Error)]
#[error("loader failed for '{entity}': {source}")]
pub struct LoaderError {
    entity: String,
    #[source]
    source: BoxError,
}

impl LoaderError {
    /// Wraps a loader-originated error.
    pub fn new<E>(entity: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            entity: entity.into(),
            source: source.into(),
        }
    }

    /// Creates an error for a loader operation that is not implemented.
    pub fn unsupported(entity: impl Into<String>, operation: &str) -> Self {
        Self::new(entity, format!("operation '{}' is not supported", operation))
    }

    /// Returns the entity type the failing load was for.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns the original error.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }

    /// Consumes the wrapper and returns the original error.
    pub fn into_inner(self) -> BoxError {
        self.source
    }
}

/// Error packing or unpacking a cache payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("failed to encode payload: {0}")]
    Encode(String),

    #[error("failed to decode payload: {0}")]
    Decode(String),
}

/// Main error type for idcache operations.
#[derive(Debug, Error)]
pub enum IdCacheError {
    /// The data loader failed. Never raised for cache transport problems.
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// A record required by the caller does not exist.
    #[error("{entity} with id '{id}' not found")]
    NotFound {
        /// Entity type that was requested
        entity: String,
        /// Identifier that was requested
        id: RecordId,
    },

    /// The entity type was never registered.
    #[error("entity '{0}' is not registered for caching")]
    UnknownEntity(String),

    /// The association is not declared on the entity.
    #[error("association '{association}' is not declared on '{entity}'")]
    UnknownAssociation { entity: String, association: String },

    /// The index is not declared on the entity.
    #[error("index '{index}' is not declared on '{entity}'")]
    UnknownIndex { entity: String, index: String },

    /// A payload could not be packed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Invalid configuration or registry definition.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IdCacheError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: RecordId) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id,
        }
    }

    /// Creates an UnknownEntity error.
    pub fn unknown_entity(entity: impl Into<String>) -> Self {
        Self::UnknownEntity(entity.into())
    }

    /// Creates an UnknownAssociation error.
    pub fn unknown_association(entity: impl Into<String>, association: impl Into<String>) -> Self {
        Self::UnknownAssociation {
            entity: entity.into(),
            association: association.into(),
        }
    }

    /// Creates an UnknownIndex error.
    pub fn unknown_index(entity: impl Into<String>, index: impl Into<String>) -> Self {
        Self::UnknownIndex {
            entity: entity.into(),
            index: index.into(),
        }
    }

    /// Creates a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns true if the record was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the error came from the data loader.
    pub fn is_loader_error(&self) -> bool {
        matches!(self, Self::Loader(_))
    }

    /// Returns the loader error, if this is one.
    pub fn as_loader_error(&self) -> Option<&LoaderError> {
        match self {
            Self::Loader(e) => Some(e),
            _ => None,
        }
    }
}

/// Type alias for Results with IdCacheError.
pub type Result<T> = std::result::Result<T, IdCacheError>;
