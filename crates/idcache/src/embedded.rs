//! Parents stored together with their declared associations.

use std::collections::HashMap;
use std::sync::Arc;

use idcache_core::{
    AssociationDefinition, AssociationMode, CachedValue, EmbeddedBundle, EntityRegistry,
    IdCacheError, Record, RecordId, Result,
};

use crate::fetcher::CacheFetcher;
use crate::instrumentation::InstrumentationBus;
use crate::loader::RecordLoader;

/// Freshly loaded contents of one association.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedAssociation {
    Records(Vec<Record>),
    Ids(Vec<RecordId>),
}

impl LoadedAssociation {
    /// Replaces the association's contents in `bundle`.
    pub fn apply_to(self, association: &str, bundle: &mut EmbeddedBundle) {
        match self {
            Self::Records(records) => bundle.set_children(association, records),
            Self::Ids(ids) => bundle.set_child_ids(association, ids),
        }
    }
}

/// Builds and unpacks the denormalized bundles kept under parent keys.
///
/// Loading a bundle costs one query for the parent table plus one per
/// declared association, whether one parent or many are built.
pub struct EmbeddedAssociationCache {
    registry: Arc<EntityRegistry>,
    loader: Arc<dyn RecordLoader>,
    bus: InstrumentationBus,
}

impl EmbeddedAssociationCache {
    pub fn new(
        registry: Arc<EntityRegistry>,
        loader: Arc<dyn RecordLoader>,
        bus: InstrumentationBus,
    ) -> Self {
        Self {
            registry,
            loader,
            bus,
        }
    }

    pub fn loader(&self) -> &Arc<dyn RecordLoader> {
        &self.loader
    }

    pub fn bus(&self) -> &InstrumentationBus {
        &self.bus
    }

    /// Loads one parent with all of its associations.
    ///
    /// # Errors
    ///
    /// `IdCacheError::UnknownEntity` for unregistered entities, and
    /// `IdCacheError::Loader` when the loader fails.
    pub async fn build(&self, entity: &str, id: &RecordId) -> Result<Option<EmbeddedBundle>> {
        let definition = self.registry.get(entity)?;

        self.bus.query(entity, "load_one");
        let Some(parent) = self.loader.load_one(entity, id).await? else {
            return Ok(None);
        };

        let mut bundle = EmbeddedBundle::new(parent);
        for association in definition.associations() {
            self.load_association(entity, id, association)
                .await?
                .apply_to(association.name(), &mut bundle);
        }
        Ok(Some(bundle))
    }

    /// Loads many parents with their associations, one query per table.
    ///
    /// Absent parents are missing from the map.
    pub async fn build_many(
        &self,
        entity: &str,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, EmbeddedBundle>> {
        let definition = self.registry.get(entity)?;
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.bus.query(entity, format!("load_many({})", ids.len()));
        let parents = self.loader.load_many(entity, ids).await?;

        let found: Vec<RecordId> = ids
            .iter()
            .filter(|id| parents.contains_key(*id))
            .cloned()
            .collect();
        let mut bundles: HashMap<RecordId, EmbeddedBundle> = parents
            .into_iter()
            .map(|(id, record)| (id, EmbeddedBundle::new(record)))
            .collect();

        if found.is_empty() {
            return Ok(bundles);
        }

        for association in definition.associations() {
            let name = association.name();
            let statement = format!("load_associations({}.{}, {})", entity, name, found.len());
            self.bus.query(association.child_entity(), statement);

            match association.mode() {
                AssociationMode::Embed => {
                    let mut loaded = self.loader.load_associations(entity, &found, name).await?;
                    for (id, bundle) in bundles.iter_mut() {
                        bundle.set_children(name, loaded.remove(id).unwrap_or_default());
                    }
                },
                AssociationMode::Ids => {
                    let mut loaded = self
                        .loader
                        .load_association_ids(entity, &found, name)
                        .await?;
                    for (id, bundle) in bundles.iter_mut() {
                        bundle.set_child_ids(name, loaded.remove(id).unwrap_or_default());
                    }
                },
            }
        }

        Ok(bundles)
    }

    /// Loads one association of one parent.
    pub async fn load_association(
        &self,
        entity: &str,
        parent_id: &RecordId,
        association: &AssociationDefinition,
    ) -> Result<LoadedAssociation> {
        let name = association.name();
        self.bus.query(
            association.child_entity(),
            format!("load_association({}.{})", entity, name),
        );

        match association.mode() {
            AssociationMode::Embed => {
                let records = self.loader.load_association(entity, parent_id, name).await?;
                Ok(LoadedAssociation::Records(records))
            },
            AssociationMode::Ids => {
                let mut loaded = self
                    .loader
                    .load_association_ids(entity, std::slice::from_ref(parent_id), name)
                    .await?;
                Ok(LoadedAssociation::Ids(
                    loaded.remove(parent_id).unwrap_or_default(),
                ))
            },
        }
    }

    /// Packs a bundle into the value stored under the parent's key.
    pub fn pack(bundle: EmbeddedBundle) -> CachedValue {
        CachedValue::from_bundle(bundle)
    }

    /// Returns the bundle held by a cached value, if it holds a record.
    pub fn unpack(value: CachedValue) -> Option<EmbeddedBundle> {
        value.into_bundle()
    }
}

impl std::fmt::Debug for EmbeddedAssociationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedAssociationCache")
            .field("entities", &self.registry.len())
            .finish()
    }
}

impl CacheFetcher {
    /// Returns the children of one association of a cached parent.
    ///
    /// Embedded children come straight from the parent's bundle. Id-cached
    /// children are resolved with one [`fetch_many`](Self::fetch_many) on the
    /// child entity; children that no longer exist are skipped.
    ///
    /// # Errors
    ///
    /// `IdCacheError::UnknownAssociation` if the association is not declared,
    /// `IdCacheError::NotFound` if the parent does not exist.
    pub async fn fetch_association(
        &self,
        entity: &str,
        id: &RecordId,
        association: &str,
    ) -> Result<Vec<Record>> {
        let definition = self
            .keys()
            .registry()
            .get(entity)?
            .find_association(association)
            .ok_or_else(|| IdCacheError::unknown_association(entity, association))?;
        let mode = definition.mode();
        let child_entity = definition.child_entity().to_string();

        let bundle = self.fetch_required(entity, id).await?;

        match mode {
            AssociationMode::Embed => Ok(bundle
                .children(association)
                .map(<[Record]>::to_vec)
                .unwrap_or_default()),
            AssociationMode::Ids => {
                let ids = bundle
                    .child_ids(association)
                    .map(<[RecordId]>::to_vec)
                    .unwrap_or_default();
                let children = self.fetch_many(&child_entity, &ids).await?;
                Ok(children
                    .into_iter()
                    .flatten()
                    .map(EmbeddedBundle::into_parent)
                    .collect())
            },
        }
    }
}
