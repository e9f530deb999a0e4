//! Turns raw store representations into typed entities.

use indexmap::IndexMap;
use neomap_core::{ContainerKind, Identity, PropertyValue};
use serde_json::{Map, Value};

use crate::entity::{Endpoint, Entity, GraphEntity, Node, Path, PropertyContainer, Relationship};
use crate::metadata::STRUCTURAL_KEYS;
use crate::schema::{SchemaRegistry, GENERIC_NODE, GENERIC_RELATIONSHIP};

/// Builds entities from representations of the form
/// `{ "self": uri, "data": {...}, "start": uri, "end": uri, "type": t }`.
///
/// The concrete type comes from the discriminator inside `data`; when it is
/// missing or unregistered, the caller's fallback type is used instead.
#[derive(Debug, Clone, Copy)]
pub struct Materializer<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> Materializer<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Materialize one representation. Empty or non-object input yields `None`.
    pub fn materialize(&self, repr: &Value, fallback: &str) -> Option<Entity> {
        let object = repr.as_object().filter(|object| !object.is_empty())?;
        let field = self.registry.discriminator_field();
        let data = object.get("data").and_then(Value::as_object);

        let tag = data
            .and_then(|data| data.get(field))
            .or_else(|| object.get(field))
            .and_then(Value::as_str);
        let resolved = self.registry.resolve(tag, fallback);
        let metadata = match self.registry.metadata(resolved) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!(error = %err, fallback = %fallback, "Cannot materialize representation");
                return None;
            }
        };

        // Declared defaults apply to new instances only; a loaded container
        // carries exactly what the store holds.
        let mut state = PropertyContainer::new(metadata.discriminator(), &IndexMap::new());
        if let Some(uri) = object.get("self").and_then(Value::as_str) {
            match Identity::parse(uri) {
                Ok(identity) => state.commit_identity(identity),
                Err(err) => tracing::debug!(error = %err, "Ignoring malformed self reference"),
            }
        }

        for (name, value) in object {
            if STRUCTURAL_KEYS.contains(&name.as_str())
                || name == field
                || !metadata.has_property(name)
            {
                continue;
            }
            copy_property(&mut state, name, value);
        }

        if let Some(data) = data {
            for (name, value) in data {
                if name != field {
                    copy_property(&mut state, name, value);
                }
            }
        }

        state.mark_persisted();

        let mut entity = match metadata.kind() {
            ContainerKind::Node => Entity::Node(Node::from_state(state)),
            ContainerKind::Relationship => {
                Entity::Relationship(relationship_from(state, object))
            }
        };
        if let Some(hook) = metadata.after_materialize() {
            hook(entity.state_mut());
        }
        Some(entity)
    }

    /// Materialize a list of representations, skipping the unusable ones.
    pub fn materialize_all<'v, I>(&self, reprs: I, fallback: &str) -> Vec<Entity>
    where
        I: IntoIterator<Item = &'v Value>,
    {
        reprs
            .into_iter()
            .filter_map(|repr| self.materialize(repr, fallback))
            .collect()
    }

    /// Materialize a path given as an ordered array of representations. Items
    /// are classified as node or relationship by their resource URI.
    pub fn materialize_path(&self, repr: &Value) -> Option<Path> {
        let items = repr.as_array()?;
        let entities = items
            .iter()
            .filter_map(|item| {
                let kind = item
                    .get("self")
                    .and_then(Value::as_str)
                    .and_then(|uri| Identity::parse(uri).ok())
                    .and_then(|identity| identity.kind_hint())?;
                let fallback = match kind {
                    ContainerKind::Node => GENERIC_NODE,
                    ContainerKind::Relationship => GENERIC_RELATIONSHIP,
                };
                self.materialize(item, fallback)
            })
            .collect();
        Some(Path::new(entities))
    }
}

fn copy_property(state: &mut PropertyContainer, name: &str, value: &Value) {
    match PropertyValue::from_json(value) {
        Some(value) => {
            state.set(name, value);
        }
        None => tracing::debug!(property = %name, "Skipping property with unstorable value"),
    }
}

fn relationship_from(state: PropertyContainer, object: &Map<String, Value>) -> Relationship {
    let mut relationship = Relationship::from_state(state);
    if let Some(rel_type) = object.get("type").and_then(Value::as_str) {
        relationship.load_type(rel_type);
    }
    let endpoint = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .and_then(|uri| Identity::parse(uri).ok())
            .map(Endpoint::Remote)
    };
    relationship.start = endpoint("start");
    relationship.end = endpoint("end");
    relationship
}
