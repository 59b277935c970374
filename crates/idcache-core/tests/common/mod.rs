#![allow(dead_code)]
use std::sync::Arc;

use idcache_core::{CacheKeyBuilder, EntityDefinition, EntityRegistry};

/// Order embeds its items and caches its tag ids; Customer is standalone.
pub fn shop_registry() -> EntityRegistry {
    shop_registry_with_item_columns(&[("id", "bigint"), ("sku", "text")])
}

/// Same shop, with a custom Item schema.
pub fn shop_registry_with_item_columns(columns: &[(&str, &str)]) -> EntityRegistry {
    let item = columns
        .iter()
        .fold(EntityDefinition::new("Item"), |def, (name, ty)| def.column(*name, *ty));

    EntityRegistry::builder()
        .entity(item)
        .entity(EntityDefinition::new("Tag").column("name", "text"))
        .entity(EntityDefinition::new("Customer").column("email", "text"))
        .entity(
            EntityDefinition::new("Order")
                .column("id", "bigint")
                .column("customer_id", "bigint")
                .embeds_many("items", "Item")
                .caches_ids("tags", "Tag")
                .index("by_customer", vec!["customer_id"]),
        )
        .build()
        .expect("Failed to build test registry")
}

/// Key builder over [`shop_registry`] in the given namespace.
pub fn keys(namespace: &str) -> CacheKeyBuilder {
    CacheKeyBuilder::new(namespace, Arc::new(shop_registry()))
}
