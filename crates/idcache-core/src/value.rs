//! Decoded cache payloads.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::RecordId;
use crate::error::CodecError;

/// A serialized record as produced by the data loader.
pub type Record = serde_json::Value;

/// A parent record stored together with its cached associations.
///
/// Always written as a unit: changing one association rewrites the whole
/// bundle under the parent's key.
///
/// # Example
///
/// ```
/// use idcache_core::EmbeddedBundle;
/// use serde_json::json;
///
/// let bundle = EmbeddedBundle::new(json!({"id": 42}))
///     .with_children("items", vec![json!({"id": 1}), json!({"id": 2})]);
///
/// assert_eq!(bundle.children("items").map(|c| c.len()), Some(2));
/// assert!(bundle.children("coupons").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedBundle {
    parent: Record,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    children: IndexMap<String, Vec<Record>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    child_ids: IndexMap<String, Vec<RecordId>>,
}

impl EmbeddedBundle {
    pub fn new(parent: Record) -> Self {
        Self {
            parent,
            children: IndexMap::new(),
            child_ids: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_children(mut self, association: impl Into<String>, children: Vec<Record>) -> Self {
        self.set_children(association, children);
        self
    }

    #[must_use]
    pub fn with_child_ids(mut self, association: impl Into<String>, ids: Vec<RecordId>) -> Self {
        self.set_child_ids(association, ids);
        self
    }

    /// Replaces the embedded records of one association.
    pub fn set_children(&mut self, association: impl Into<String>, children: Vec<Record>) {
        self.children.insert(association.into(), children);
    }

    /// Replaces the cached child ids of one association.
    pub fn set_child_ids(&mut self, association: impl Into<String>, ids: Vec<RecordId>) {
        self.child_ids.insert(association.into(), ids);
    }

    pub fn parent(&self) -> &Record {
        &self.parent
    }

    pub fn into_parent(self) -> Record {
        self.parent
    }

    /// Deserializes the parent record into a concrete type.
    pub fn parent_as<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        serde_json::from_value(self.parent.clone()).map_err(|e| CodecError::Decode(e.to_string()))
    }

    /// Returns the embedded records of an association.
    pub fn children(&self, association: &str) -> Option<&[Record]> {
        self.children.get(association).map(Vec::as_slice)
    }

    /// Deserializes the embedded records of an association.
    ///
    /// An association that is not present yields an empty list.
    pub fn children_as<T: DeserializeOwned>(&self, association: &str) -> Result<Vec<T>, CodecError> {
        self.children(association)
            .unwrap_or_default()
            .iter()
            .map(|child| {
                serde_json::from_value(child.clone()).map_err(|e| CodecError::Decode(e.to_string()))
            })
            .collect()
    }

    /// Returns the cached child ids of an id-only association.
    pub fn child_ids(&self, association: &str) -> Option<&[RecordId]> {
        self.child_ids.get(association).map(Vec::as_slice)
    }

    /// Returns true if nothing besides the parent record is stored.
    pub fn is_bare(&self) -> bool {
        self.children.is_empty() && self.child_ids.is_empty()
    }
}

/// Everything that can be stored under a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum CachedValue {
    /// A record without cached associations.
    Record(Record),
    /// A record with its cached associations.
    Bundle(EmbeddedBundle),
    /// The ids behind a cached index lookup.
    Ids(Vec<RecordId>),
    /// Negative-cache marker: the loader reported the record absent.
    Missing,
    /// Invalidation tombstone: the entry must be reloaded.
    Deleted,
}

impl CachedValue {
    /// Stores a bundle in its most compact form.
    pub fn from_bundle(bundle: EmbeddedBundle) -> Self {
        if bundle.is_bare() {
            Self::Record(bundle.parent)
        } else {
            Self::Bundle(bundle)
        }
    }

    /// Returns the record as a bundle, if this value holds a record.
    pub fn into_bundle(self) -> Option<EmbeddedBundle> {
        match self {
            Self::Record(record) => Some(EmbeddedBundle::new(record)),
            Self::Bundle(bundle) => Some(bundle),
            _ => None,
        }
    }

    /// Returns true for the invalidation tombstone.
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    /// Returns true if this value answers a read without a reload.
    pub fn is_usable(&self) -> bool {
        !self.is_tombstone()
    }
}
