//! Entity definitions and the discriminator registry.
//!
//! Every concrete entity type is registered under its discriminator, the tag
//! persisted in each container's data so the type can be recovered on load.
//! Registration happens once at startup; afterwards the registry is shared
//! read-only and memoizes one [`EntityMetadata`] per type.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use neomap_core::{ContainerKind, MappingConfig, PropertyValue};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::entity::{Node, PropertyContainer, Relationship};
use crate::error::{GraphError, Result};
use crate::metadata::EntityMetadata;

/// Discriminator of the built-in generic node type.
pub const GENERIC_NODE: &str = "Node";

/// Discriminator of the built-in generic relationship type.
pub const GENERIC_RELATIONSHIP: &str = "Relationship";

/// Hook run on every freshly materialized instance of a type.
pub type MaterializeHook = fn(&mut PropertyContainer);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// What a relation's traversal returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationTarget {
    Node,
    Relationship,
    Path,
}

/// A named traversal declared on a node type. `fragment` is the query
/// continuation appended after the anchor, e.g. `out('KNOWS')`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub cardinality: Cardinality,
    pub target: RelationTarget,
    pub fragment: String,
}

impl RelationDef {
    pub fn has_one(target: RelationTarget, fragment: impl Into<String>) -> Self {
        Self {
            cardinality: Cardinality::One,
            target,
            fragment: fragment.into(),
        }
    }

    pub fn has_many(target: RelationTarget, fragment: impl Into<String>) -> Self {
        Self {
            cardinality: Cardinality::Many,
            target,
            fragment: fragment.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    pub name: String,
    pub default: Option<PropertyValue>,
}

/// Declarative description of one entity type.
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    pub discriminator: String,
    pub kind: ContainerKind,
    pub properties: Vec<PropertyDef>,
    pub relations: Vec<(String, RelationDef)>,
    /// Overrides the configured auto-index name for this type.
    pub index_name: Option<String>,
    pub after_materialize: Option<MaterializeHook>,
}

impl EntityDefinition {
    pub fn new(discriminator: impl Into<String>, kind: ContainerKind) -> Self {
        Self {
            discriminator: discriminator.into(),
            kind,
            properties: Vec::new(),
            relations: Vec::new(),
            index_name: None,
            after_materialize: None,
        }
    }

    pub fn node(discriminator: impl Into<String>) -> Self {
        Self::new(discriminator, ContainerKind::Node)
    }

    pub fn relationship(discriminator: impl Into<String>) -> Self {
        Self::new(discriminator, ContainerKind::Relationship)
    }

    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.properties.push(PropertyDef {
            name: name.into(),
            default: None,
        });
        self
    }

    pub fn property_with_default(
        mut self,
        name: impl Into<String>,
        default: impl Into<PropertyValue>,
    ) -> Self {
        self.properties.push(PropertyDef {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    pub fn relation(mut self, name: impl Into<String>, def: RelationDef) -> Self {
        self.relations.push((name.into(), def));
        self
    }

    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    pub fn after_materialize(mut self, hook: MaterializeHook) -> Self {
        self.after_materialize = Some(hook);
        self
    }
}

/// A Rust type that maps onto one registered entity type.
///
/// The serde representation must be a flat map of storable values; it is
/// converted to and from a container's properties by
/// [`Node::from_model`] and [`Node::to_model`].
pub trait Model: Serialize + DeserializeOwned {
    const DISCRIMINATOR: &'static str;
    const KIND: ContainerKind = ContainerKind::Node;

    fn definition() -> EntityDefinition {
        EntityDefinition::new(Self::DISCRIMINATOR, Self::KIND)
    }
}

struct RegistryEntry {
    definition: EntityDefinition,
    metadata: OnceLock<Arc<EntityMetadata>>,
}

/// Discriminator registry and metadata cache.
pub struct SchemaRegistry {
    mapping: MappingConfig,
    entries: HashMap<String, RegistryEntry>,
}

impl SchemaRegistry {
    /// An empty registry holding only the generic `Node` and `Relationship` types.
    pub fn new(mapping: MappingConfig) -> Self {
        let mut registry = Self {
            mapping,
            entries: HashMap::new(),
        };
        registry.register(EntityDefinition::node(GENERIC_NODE));
        registry.register(EntityDefinition::relationship(GENERIC_RELATIONSHIP));
        registry
    }

    pub fn mapping(&self) -> &MappingConfig {
        &self.mapping
    }

    pub fn discriminator_field(&self) -> &str {
        &self.mapping.discriminator_field
    }

    /// Register a type under its discriminator, replacing any earlier definition.
    pub fn register(&mut self, definition: EntityDefinition) -> &mut Self {
        let discriminator = definition.discriminator.clone();
        let replaced = self
            .entries
            .insert(
                discriminator.clone(),
                RegistryEntry {
                    definition,
                    metadata: OnceLock::new(),
                },
            )
            .is_some();
        if replaced {
            tracing::warn!(discriminator = %discriminator, "Entity type registered twice, keeping the latest definition");
        } else {
            tracing::debug!(discriminator = %discriminator, "Entity type registered");
        }
        self
    }

    pub fn register_model<T: Model>(&mut self) -> &mut Self {
        self.register(T::definition())
    }

    pub fn contains(&self, discriminator: &str) -> bool {
        self.entries.contains_key(discriminator)
    }

    pub fn definition(&self, discriminator: &str) -> Option<&EntityDefinition> {
        self.entries.get(discriminator).map(|entry| &entry.definition)
    }

    pub fn discriminators(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The type to instantiate for a stored tag: the tag itself when it is
    /// registered, otherwise `fallback`.
    pub fn resolve<'a>(&'a self, tag: Option<&'a str>, fallback: &'a str) -> &'a str {
        match tag {
            Some(tag) if self.contains(tag) => tag,
            Some(tag) => {
                tracing::debug!(tag = %tag, fallback = %fallback, "Unknown discriminator, using fallback type");
                fallback
            }
            None => fallback,
        }
    }

    /// Metadata for a registered type, built on first request and cached.
    pub fn metadata(&self, discriminator: &str) -> Result<Arc<EntityMetadata>> {
        let entry = self.entries.get(discriminator).ok_or_else(|| {
            GraphError::Configuration(format!("entity type {discriminator:?} is not registered"))
        })?;

        if let Some(metadata) = entry.metadata.get() {
            return Ok(Arc::clone(metadata));
        }

        let built = Arc::new(EntityMetadata::build(&entry.definition, &self.mapping)?);
        Ok(Arc::clone(entry.metadata.get_or_init(|| built)))
    }

    /// A fresh, unsaved node of a registered node type with defaults applied.
    pub fn new_node(&self, discriminator: &str) -> Result<Node> {
        let metadata = self.metadata_of_kind(discriminator, ContainerKind::Node)?;
        Ok(Node::from_state(PropertyContainer::new(
            metadata.discriminator(),
            metadata.defaults(),
        )))
    }

    /// A fresh, unsaved relationship of a registered relationship type.
    pub fn new_relationship(&self, discriminator: &str, rel_type: &str) -> Result<Relationship> {
        let metadata = self.metadata_of_kind(discriminator, ContainerKind::Relationship)?;
        let mut relationship = Relationship::from_state(PropertyContainer::new(
            metadata.discriminator(),
            metadata.defaults(),
        ));
        relationship.set_type(rel_type)?;
        Ok(relationship)
    }

    fn metadata_of_kind(&self, discriminator: &str, kind: ContainerKind) -> Result<Arc<EntityMetadata>> {
        let metadata = self.metadata(discriminator)?;
        if metadata.kind() != kind {
            return Err(GraphError::Configuration(format!(
                "entity type {discriminator:?} is a {}, not a {kind}",
                metadata.kind()
            )));
        }
        Ok(metadata)
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.discriminators().collect();
        types.sort_unstable();
        f.debug_struct("SchemaRegistry")
            .field("discriminator_field", &self.mapping.discriminator_field)
            .field("types", &types)
            .finish()
    }
}
