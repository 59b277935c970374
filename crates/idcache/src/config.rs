//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use idcache_core::{IdCacheError, Result};
use serde::{Deserialize, Serialize};

/// Prefix of environment variables overriding the configuration.
pub const ENV_PREFIX: &str = "IDCACHE";

/// How an entry is expired on invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationMode {
    /// Overwrite with a short-lived tombstone. Fills racing the invalidation
    /// cannot resurrect the old value.
    #[default]
    Tombstone,
    /// Delete the key.
    ///
    /// Leaves nothing for a racing fill to collide with: a reader that loaded
    /// before the commit can store the old value after the invalidation, and
    /// it stays until its TTL. Only for backends that cannot hold tombstones.
    Delete,
}

/// What happens to a parent bundle when an embedded child changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentRefresh {
    /// Expire the parent's key; the next read rebuilds it.
    #[default]
    Expire,
    /// Reload the changed association and rewrite the bundle under CAS.
    Rebuild,
}

/// Configuracion del cache.
///
/// # Example
///
/// ```
/// use idcache::IdCacheConfig;
///
/// let config = IdCacheConfig::default();
/// assert!(config.enabled);
/// assert_eq!(config.namespace, "IDC");
/// assert_eq!(config.cas_max_retries, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdCacheConfig {
    /// Si es false, todas las lecturas van directo al loader (default: true)
    pub enabled: bool,
    /// Prefijo de todas las keys (default: "IDC")
    pub namespace: String,
    /// Store a marker for records the loader reports absent (default: false)
    pub negative_cache: bool,
    /// Retries after a CAS conflict before the key is expired (default: 2)
    pub cas_max_retries: u32,
    /// Timeout de cada operacion contra el backend en ms (default: 500)
    pub operation_timeout_ms: u64,
    /// TTL de los tombstones en segundos (default: 60)
    pub tombstone_ttl_secs: u64,
    /// TTL de las entries llenadas desde el loader (default: none)
    pub entry_ttl_secs: Option<u64>,
    pub invalidation_mode: InvalidationMode,
    pub parent_refresh: ParentRefresh,
}

impl Default for IdCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "IDC".to_string(),
            negative_cache: false,
            cas_max_retries: 2,
            operation_timeout_ms: 500,
            tombstone_ttl_secs: 60,
            entry_ttl_secs: None,
            invalidation_mode: InvalidationMode::default(),
            parent_refresh: ParentRefresh::default(),
        }
    }
}

impl IdCacheConfig {
    /// Loads the configuration from an optional file plus `IDCACHE__*`
    /// environment variables, which take precedence.
    ///
    /// `IDCACHE__NAMESPACE=shop` sets `namespace`, and so on.
    ///
    /// # Errors
    ///
    /// Returns `IdCacheError::Config` if a source cannot be read or a value
    /// has the wrong type, or if the result fails [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| IdCacheError::config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Checks values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns `IdCacheError::Config` for an empty namespace, a namespace
    /// containing whitespace or `:`, or a zero operation timeout.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(IdCacheError::config("namespace cannot be empty"));
        }
        if self
            .namespace
            .chars()
            .any(|c| c == ':' || c.is_whitespace() || c.is_control())
        {
            return Err(IdCacheError::config(format!(
                "namespace '{}' cannot contain ':' or whitespace",
                self.namespace
            )));
        }
        if self.operation_timeout_ms == 0 {
            return Err(IdCacheError::config("operation_timeout_ms must be positive"));
        }
        Ok(())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn tombstone_ttl(&self) -> Duration {
        Duration::from_secs(self.tombstone_ttl_secs)
    }

    pub fn entry_ttl(&self) -> Option<Duration> {
        self.entry_ttl_secs.map(Duration::from_secs)
    }
}
