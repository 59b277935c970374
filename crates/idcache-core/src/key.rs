//! Cache key generation.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::{IdCacheError, Result};
use crate::model::EntityRegistry;
use crate::{RecordId, ScalarValue};

/// Longest key accepted by memcached-style stores.
pub const MAX_KEY_LENGTH: usize = 250;

/// Discriminator that marks index keys.
const INDEX_MARKER: &str = "idx";

/// Unique key of one cache entry.
///
/// Two keys are equal iff namespace, version, entity, identifier and extra
/// arguments all match. The rendered backend key is derived from those fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    namespace: String,
    version: String,
    entity: String,
    identifier: RecordId,
    extra: Vec<ScalarValue>,
    rendered: String,
}

impl CacheKey {
    /// Builds a key from its parts.
    ///
    /// # Examples
    ///
    /// ```
    /// use idcache_core::{CacheKey, RecordId};
    ///
    /// let key = CacheKey::new("IDC", "0a1b2c3d4e5f6789", "Order", RecordId::from(42), vec![]);
    /// assert_eq!(key.as_str(), "IDC:Order:0a1b2c3d4e5f6789:i42");
    /// ```
    pub fn new(
        namespace: impl Into<String>,
        version: impl Into<String>,
        entity: impl Into<String>,
        identifier: RecordId,
        extra: Vec<ScalarValue>,
    ) -> Self {
        let namespace = namespace.into();
        let version = version.into();
        let entity = entity.into();
        let rendered = render(&namespace, &version, &entity, &identifier, &extra);
        Self {
            namespace,
            version,
            entity,
            identifier,
            extra,
            rendered,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn identifier(&self) -> &RecordId {
        &self.identifier
    }

    pub fn extra(&self) -> &[ScalarValue] {
        &self.extra
    }

    /// Returns true if this key addresses a cached index lookup.
    pub fn is_index_key(&self) -> bool {
        self.extra.first().and_then(ScalarValue::as_str) == Some(INDEX_MARKER)
    }

    /// Returns the string sent to the backend.
    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

fn render(
    namespace: &str,
    version: &str,
    entity: &str,
    identifier: &RecordId,
    extra: &[ScalarValue],
) -> String {
    let mut out = String::with_capacity(namespace.len() + entity.len() + version.len() + 16);
    out.push_str(namespace);
    out.push(':');
    out.push_str(entity);
    out.push(':');
    out.push_str(version);
    out.push(':');
    identifier.write_key_part(&mut out);
    for part in extra {
        out.push(':');
        part.write_key_part(&mut out);
    }

    if out.len() <= MAX_KEY_LENGTH && !out.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return out;
    }

    // Too long or not transport-safe: keep the readable prefix, hash the rest.
    let digest = Sha256::digest(out.as_bytes());
    format!("{}:{}:{}:h:{}", namespace, entity, version, hex::encode(digest))
}

/// Derives versioned keys for registered entities.
///
/// Pure: the same inputs always produce the same key.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    namespace: String,
    registry: Arc<EntityRegistry>,
}

impl CacheKeyBuilder {
    pub fn new(namespace: impl Into<String>, registry: Arc<EntityRegistry>) -> Self {
        Self {
            namespace: namespace.into(),
            registry,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Key of a record (and of its embedded associations).
    pub fn record_key(&self, entity: &str, id: &RecordId) -> Result<CacheKey> {
        self.key(entity, id, Vec::new())
    }

    /// Key with extra discriminators.
    pub fn key(&self, entity: &str, id: &RecordId, extra: Vec<ScalarValue>) -> Result<CacheKey> {
        let version = self.registry.version(entity)?;
        Ok(CacheKey::new(
            self.namespace.as_str(),
            version,
            entity,
            id.clone(),
            extra,
        ))
    }

    /// Keys for a batch of ids, in the same order.
    pub fn record_keys(&self, entity: &str, ids: &[RecordId]) -> Result<Vec<CacheKey>> {
        let version = self.registry.version(entity)?;
        Ok(ids
            .iter()
            .map(|id| CacheKey::new(self.namespace.as_str(), version, entity, id.clone(), Vec::new()))
            .collect())
    }

    /// Key of a cached index lookup.
    ///
    /// # Errors
    ///
    /// Returns `IdCacheError::UnknownIndex` if the index is not declared, or
    /// `IdCacheError::Config` if the number of values does not match its fields.
    pub fn index_key(&self, entity: &str, index: &str, values: &RecordId) -> Result<CacheKey> {
        let definition = self
            .registry
            .get(entity)?
            .find_index(index)
            .ok_or_else(|| IdCacheError::unknown_index(entity, index))?;
        if definition.fields().len() != values.parts().len() {
            return Err(IdCacheError::config(format!(
                "index '{}' on '{}' expects {} values, got {}",
                index,
                entity,
                definition.fields().len(),
                values.parts().len()
            )));
        }
        self.key(
            entity,
            values,
            vec![ScalarValue::from(INDEX_MARKER), ScalarValue::from(index)],
        )
    }
}
