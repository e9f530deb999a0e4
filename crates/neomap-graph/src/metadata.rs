//! Per-type mapping metadata, derived once from an [`EntityDefinition`].

use indexmap::IndexMap;
use neomap_core::{ContainerKind, MappingConfig, PropertyValue};

use crate::error::{GraphError, Result};
use crate::schema::{EntityDefinition, MaterializeHook, RelationDef};

/// Keys of a store representation that are never treated as properties.
pub(crate) const STRUCTURAL_KEYS: [&str; 5] = ["self", "data", "start", "end", "type"];

#[derive(Debug)]
pub struct EntityMetadata {
    discriminator: String,
    kind: ContainerKind,
    properties: Vec<String>,
    defaults: IndexMap<String, PropertyValue>,
    relations: IndexMap<String, RelationDef>,
    index_name: String,
    after_materialize: Option<MaterializeHook>,
}

impl EntityMetadata {
    pub(crate) fn build(definition: &EntityDefinition, mapping: &MappingConfig) -> Result<Self> {
        let discriminator = &definition.discriminator;
        let invalid = |reason: String| {
            GraphError::Configuration(format!("entity type {discriminator:?}: {reason}"))
        };

        if discriminator.trim().is_empty() {
            return Err(GraphError::Configuration(
                "entity type with an empty discriminator".to_string(),
            ));
        }

        let mut properties = Vec::with_capacity(definition.properties.len());
        let mut defaults = IndexMap::new();
        for property in &definition.properties {
            if property.name.trim().is_empty() {
                return Err(invalid("property with an empty name".to_string()));
            }
            if property.name == mapping.discriminator_field
                || STRUCTURAL_KEYS.contains(&property.name.as_str())
            {
                return Err(invalid(format!("property name {:?} is reserved", property.name)));
            }
            if !properties.contains(&property.name) {
                properties.push(property.name.clone());
            }
            if let Some(default) = &property.default {
                defaults.insert(property.name.clone(), default.clone());
            }
        }

        let mut relations = IndexMap::new();
        for (name, relation) in &definition.relations {
            if name.trim().is_empty() {
                return Err(invalid("relation with an empty name".to_string()));
            }
            if relation.fragment.trim().is_empty() {
                return Err(invalid(format!("relation {name:?} has an empty query fragment")));
            }
            if definition.kind == ContainerKind::Relationship {
                return Err(invalid(format!(
                    "relation {name:?} declared on a relationship type"
                )));
            }
            if relations.insert(name.clone(), relation.clone()).is_some() {
                return Err(invalid(format!("relation {name:?} declared twice")));
            }
        }

        let index_name = definition.index_name.clone().unwrap_or_else(|| match definition.kind {
            ContainerKind::Node => mapping.node_index.clone(),
            ContainerKind::Relationship => mapping.relationship_index.clone(),
        });

        tracing::trace!(
            discriminator = %discriminator,
            properties = properties.len(),
            relations = relations.len(),
            "Entity metadata built"
        );

        Ok(Self {
            discriminator: discriminator.clone(),
            kind: definition.kind,
            properties,
            defaults,
            relations,
            index_name,
            after_materialize: definition.after_materialize,
        })
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Declared property names, in declaration order.
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p == name)
    }

    pub fn defaults(&self) -> &IndexMap<String, PropertyValue> {
        &self.defaults
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, &RelationDef)> {
        self.relations.iter().map(|(name, def)| (name.as_str(), def))
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Collection path new containers of this type are created under, e.g. `/node`.
    pub fn resource_path(&self) -> String {
        format!("/{}", self.kind.resource())
    }

    /// Path of this type's auto index, e.g. `/index/node/neomap_node_autoindex`.
    pub fn index_path(&self) -> String {
        format!("/{}/{}", self.kind.index_resource(), self.index_name)
    }

    pub fn after_materialize(&self) -> Option<MaterializeHook> {
        self.after_materialize
    }
}
