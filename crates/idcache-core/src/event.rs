//! Record lifecycle events.

use std::collections::BTreeSet;
use std::fmt;

use crate::{CacheKey, RecordId};

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleKind {
    Created,
    Updated,
    Destroyed,
}

impl LifecycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification that a record mutation was committed.
///
/// `affected_parent_keys` lists the cache keys of parents that embed the
/// record; `affected_index_keys` lists cached index lookups whose result may
/// have changed (both the old and the new indexed values).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    entity: String,
    id: RecordId,
    kind: LifecycleKind,
    affected_parent_keys: BTreeSet<CacheKey>,
    affected_index_keys: BTreeSet<CacheKey>,
}

impl LifecycleEvent {
    pub fn new(entity: impl Into<String>, id: impl Into<RecordId>, kind: LifecycleKind) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
            kind,
            affected_parent_keys: BTreeSet::new(),
            affected_index_keys: BTreeSet::new(),
        }
    }

    pub fn created(entity: impl Into<String>, id: impl Into<RecordId>) -> Self {
        Self::new(entity, id, LifecycleKind::Created)
    }

    pub fn updated(entity: impl Into<String>, id: impl Into<RecordId>) -> Self {
        Self::new(entity, id, LifecycleKind::Updated)
    }

    pub fn destroyed(entity: impl Into<String>, id: impl Into<RecordId>) -> Self {
        Self::new(entity, id, LifecycleKind::Destroyed)
    }

    #[must_use]
    pub fn with_parent_key(mut self, key: CacheKey) -> Self {
        self.affected_parent_keys.insert(key);
        self
    }

    #[must_use]
    pub fn with_index_key(mut self, key: CacheKey) -> Self {
        self.affected_index_keys.insert(key);
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn kind(&self) -> LifecycleKind {
        self.kind
    }

    pub fn affected_parent_keys(&self) -> &BTreeSet<CacheKey> {
        &self.affected_parent_keys
    }

    pub fn affected_index_keys(&self) -> &BTreeSet<CacheKey> {
        &self.affected_index_keys
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.entity, self.id, self.kind)
    }
}
