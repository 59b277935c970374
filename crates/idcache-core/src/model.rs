//! Entity definitions and the registry of cached entity types.
//!
//! An entity declares its schema (used for the key version), the associations
//! cached together with it, and the secondary indexes whose id lists are
//! cached. The registry is built once at startup and is immutable afterwards.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{IdCacheError, Result};

/// Version of the payload layout written by this crate.
///
/// Bumping it makes every existing entry unreachable.
pub const PAYLOAD_FORMAT_VERSION: u32 = 1;

/// How an association is stored inside the parent's cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationMode {
    /// Child records are serialized into the parent's bundle.
    Embed,
    /// Only the child ids are stored; children are fetched through their own keys.
    Ids,
}

/// A child association cached with its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDefinition {
    name: String,
    child_entity: String,
    mode: AssociationMode,
}

impl AssociationDefinition {
    pub fn new(name: impl Into<String>, child_entity: impl Into<String>, mode: AssociationMode) -> Self {
        Self {
            name: name.into(),
            child_entity: child_entity.into(),
            mode,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn child_entity(&self) -> &str {
        &self.child_entity
    }

    pub fn mode(&self) -> AssociationMode {
        self.mode
    }
}

/// A secondary index whose lookup result (a list of ids) is cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    name: String,
    fields: Vec<String>,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, fields: Vec<impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Declaration of one cached entity type.
///
/// # Example
///
/// ```
/// use idcache_core::EntityDefinition;
///
/// let order = EntityDefinition::new("Order")
///     .column("id", "integer")
///     .column("total_cents", "integer")
///     .embeds_many("items", "Item")
///     .index("by_customer", vec!["customer_id"]);
///
/// assert_eq!(order.associations().len(), 1);
/// assert!(order.find_index("by_customer").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDefinition {
    name: String,
    columns: Vec<(String, String)>,
    associations: Vec<AssociationDefinition>,
    indexes: Vec<IndexDefinition>,
}

impl EntityDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            associations: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Declares a schema column. Column changes bump the entity's key version.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        self.columns.push((name.into(), sql_type.into()));
        self
    }

    /// Declares an association whose child records are embedded in the parent's entry.
    #[must_use]
    pub fn embeds_many(self, name: impl Into<String>, child_entity: impl Into<String>) -> Self {
        self.association(AssociationDefinition::new(name, child_entity, AssociationMode::Embed))
    }

    /// Declares an association of which only the child ids are cached with the parent.
    #[must_use]
    pub fn caches_ids(self, name: impl Into<String>, child_entity: impl Into<String>) -> Self {
        self.association(AssociationDefinition::new(name, child_entity, AssociationMode::Ids))
    }

    #[must_use]
    pub fn association(mut self, association: AssociationDefinition) -> Self {
        self.associations.push(association);
        self
    }

    /// Declares a cached secondary index.
    #[must_use]
    pub fn index(mut self, name: impl Into<String>, fields: Vec<impl Into<String>>) -> Self {
        self.indexes.push(IndexDefinition::new(name, fields));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[(String, String)] {
        &self.columns
    }

    pub fn associations(&self) -> &[AssociationDefinition] {
        &self.associations
    }

    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    pub fn find_association(&self, name: &str) -> Option<&AssociationDefinition> {
        self.associations.iter().find(|a| a.name == name)
    }

    pub fn find_index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Returns true if the entity caches anything besides its own record.
    pub fn has_associations(&self) -> bool {
        !self.associations.is_empty()
    }
}

/// Immutable set of cached entity types with their schema versions.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: HashMap<String, EntityDefinition>,
    versions: HashMap<String, String>,
}

impl EntityRegistry {
    pub fn builder() -> EntityRegistryBuilder {
        EntityRegistryBuilder::default()
    }

    /// Returns the definition of a registered entity.
    pub fn get(&self, entity: &str) -> Result<&EntityDefinition> {
        self.entities
            .get(entity)
            .ok_or_else(|| IdCacheError::unknown_entity(entity))
    }

    /// Returns the schema version hash used in the entity's keys.
    pub fn version(&self, entity: &str) -> Result<&str> {
        self.versions
            .get(entity)
            .map(String::as_str)
            .ok_or_else(|| IdCacheError::unknown_entity(entity))
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    /// Returns `(parent entity, association)` pairs whose children are of the given entity.
    pub fn parents_of<'a>(
        &'a self,
        child_entity: &'a str,
    ) -> impl Iterator<Item = (&'a EntityDefinition, &'a AssociationDefinition)> + 'a {
        self.entities.values().flat_map(move |parent| {
            parent
                .associations
                .iter()
                .filter(move |a| a.child_entity == child_entity)
                .map(move |a| (parent, a))
        })
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Builder for [`EntityRegistry`].
#[derive(Debug, Default)]
pub struct EntityRegistryBuilder {
    entities: Vec<EntityDefinition>,
}

impl EntityRegistryBuilder {
    #[must_use]
    pub fn entity(mut self, definition: EntityDefinition) -> Self {
        self.entities.push(definition);
        self
    }

    /// Validates the definitions and computes every entity's key version.
    ///
    /// # Errors
    ///
    /// Returns `IdCacheError::Config` for duplicate entities, duplicate
    /// association names, associations pointing at unregistered entities, or
    /// embedding cycles.
    pub fn build(self) -> Result<EntityRegistry> {
        let mut entities = HashMap::with_capacity(self.entities.len());
        for definition in self.entities {
            {
                let mut names = BTreeSet::new();
                for association in &definition.associations {
                    if !names.insert(association.name.as_str()) {
                        return Err(IdCacheError::config(format!(
                            "association '{}' declared twice on '{}'",
                            association.name, definition.name
                        )));
                    }
                }
            }
            let name = definition.name.clone();
            if entities.insert(name.clone(), definition).is_some() {
                return Err(IdCacheError::config(format!(
                    "entity '{}' registered twice",
                    name
                )));
            }
        }

        for definition in entities.values() {
            for association in &definition.associations {
                if !entities.contains_key(&association.child_entity) {
                    return Err(IdCacheError::config(format!(
                        "association '{}.{}' points at unregistered entity '{}'",
                        definition.name, association.name, association.child_entity
                    )));
                }
            }
        }

        let mut versions = HashMap::with_capacity(entities.len());
        for name in entities.keys() {
            let mut visiting = Vec::new();
            schema_version(name, &entities, &mut versions, &mut visiting)?;
        }

        Ok(EntityRegistry { entities, versions })
    }
}

/// Computes (and memoizes) the key version of an entity.
///
/// Embedded children contribute their own version, since their records are
/// part of the parent's payload.
fn schema_version(
    name: &str,
    entities: &HashMap<String, EntityDefinition>,
    versions: &mut HashMap<String, String>,
    visiting: &mut Vec<String>,
) -> Result<String> {
    if let Some(version) = versions.get(name) {
        return Ok(version.clone());
    }
    if visiting.iter().any(|v| v == name) {
        return Err(IdCacheError::config(format!(
            "embedding cycle through '{}'",
            name
        )));
    }
    let definition = entities
        .get(name)
        .ok_or_else(|| IdCacheError::unknown_entity(name))?;

    visiting.push(name.to_string());

    let mut hasher = Sha256::new();
    hasher.update(PAYLOAD_FORMAT_VERSION.to_be_bytes());
    hasher.update(definition.name.as_bytes());
    for (column, sql_type) in &definition.columns {
        hasher.update(b"\x00c");
        hasher.update(column.as_bytes());
        hasher.update(b"\x00");
        hasher.update(sql_type.as_bytes());
    }
    for association in &definition.associations {
        hasher.update(b"\x00a");
        hasher.update(association.name.as_bytes());
        hasher.update(b"\x00");
        hasher.update(association.child_entity.as_bytes());
        match association.mode {
            AssociationMode::Embed => {
                let child = schema_version(&association.child_entity, entities, versions, visiting)?;
                hasher.update(b"\x00embed\x00");
                hasher.update(child.as_bytes());
            },
            AssociationMode::Ids => hasher.update(b"\x00ids"),
        }
    }

    visiting.pop();

    let digest = hasher.finalize();
    let version = hex::encode(&digest[..8]);
    versions.insert(name.to_string(), version.clone());
    Ok(version)
}
