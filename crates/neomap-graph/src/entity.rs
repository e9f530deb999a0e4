//! In-memory entity model: property containers, nodes, relationships, paths.
//!
//! A [`PropertyContainer`] carries what nodes and relationships share: the
//! instance key, the store identity once persisted, the transaction-scoped
//! local id while queued in a batch, the discriminator, and the properties.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use neomap_core::{ContainerKind, Identity, InstanceKey, LocalId, PropertyValue};
use serde_json::{Map, Value};

use crate::error::{GraphError, Result};
use crate::resolver::RelationResult;
use crate::schema::{Model, SchemaRegistry};

// ── Property container ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyContainer {
    key: InstanceKey,
    identity: Option<Identity>,
    local_id: Option<LocalId>,
    discriminator: String,
    properties: IndexMap<String, PropertyValue>,
    is_new: bool,
}

impl PropertyContainer {
    pub(crate) fn new(discriminator: &str, defaults: &IndexMap<String, PropertyValue>) -> Self {
        Self {
            key: InstanceKey::new(),
            identity: None,
            local_id: None,
            discriminator: discriminator.to_string(),
            properties: defaults.clone(),
            is_new: true,
        }
    }

    /// Key shared by every clone of this instance.
    pub fn key(&self) -> InstanceKey {
        self.key
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Set only while the container is queued in an unexecuted batch.
    pub fn local_id(&self) -> Option<LocalId> {
        self.local_id
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    pub fn properties(&self) -> &IndexMap<String, PropertyValue> {
        &self.properties
    }

    pub fn attribute(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Set a property, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Option<PropertyValue> {
        self.properties.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        self.properties.shift_remove(name)
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub(crate) fn set_local_id(&mut self, local_id: Option<LocalId>) {
        self.local_id = local_id;
    }

    /// Record the identity the store assigned or reported.
    pub(crate) fn commit_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
        self.is_new = false;
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.is_new = false;
    }

    /// Forget the store identity after the container was deleted.
    pub(crate) fn detach(&mut self) {
        self.identity = None;
        self.local_id = None;
        self.is_new = true;
    }

    /// The `data` body written to the store: the discriminator first, then
    /// every property in insertion order.
    pub fn data(&self, discriminator_field: &str) -> Map<String, Value> {
        let mut data = Map::with_capacity(self.properties.len() + 1);
        data.insert(
            discriminator_field.to_string(),
            Value::String(self.discriminator.clone()),
        );
        for (name, value) in &self.properties {
            if name != discriminator_field {
                data.insert(name.clone(), value.to_json());
            }
        }
        data
    }
}

/// Anything that can be queued in a batch.
pub trait GraphEntity: fmt::Debug {
    fn state(&self) -> &PropertyContainer;

    fn state_mut(&mut self) -> &mut PropertyContainer;

    fn as_relationship(&self) -> Option<&Relationship> {
        None
    }

    fn as_relationship_mut(&mut self) -> Option<&mut Relationship> {
        None
    }

    fn kind(&self) -> ContainerKind {
        if self.as_relationship().is_some() {
            ContainerKind::Relationship
        } else {
            ContainerKind::Node
        }
    }
}

// ── Nodes ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Node {
    state: PropertyContainer,
    pub(crate) relations: HashMap<String, RelationResult>,
}

impl Node {
    pub(crate) fn from_state(state: PropertyContainer) -> Self {
        Self {
            state,
            relations: HashMap::new(),
        }
    }

    /// Build a node from a model value. Null fields are left unset.
    pub fn from_model<T: Model>(registry: &SchemaRegistry, value: &T) -> Result<Self> {
        let mut node = registry.new_node(T::DISCRIMINATOR)?;
        let fields = match serde_json::to_value(value)? {
            Value::Object(fields) => fields,
            _ => {
                return Err(GraphError::IllegalState(format!(
                    "{} does not serialize to a map of properties",
                    T::DISCRIMINATOR
                )))
            }
        };

        for (name, field) in fields {
            if field.is_null() {
                continue;
            }
            let value = PropertyValue::from_json(&field).ok_or_else(|| {
                GraphError::IllegalState(format!(
                    "field {name:?} of {} is not a storable property",
                    T::DISCRIMINATOR
                ))
            })?;
            node.state.set(name, value);
        }
        Ok(node)
    }

    /// Decode this node's properties into a model value of its own type.
    pub fn to_model<T: Model>(&self) -> Result<T> {
        if self.discriminator() != T::DISCRIMINATOR {
            return Err(GraphError::IllegalState(format!(
                "node is a {}, not a {}",
                self.discriminator(),
                T::DISCRIMINATOR
            )));
        }
        let fields: Map<String, Value> = self
            .state
            .properties()
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    pub fn state(&self) -> &PropertyContainer {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PropertyContainer {
        &mut self.state
    }

    pub fn key(&self) -> InstanceKey {
        self.state.key()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.state.identity()
    }

    pub fn is_new(&self) -> bool {
        self.state.is_new()
    }

    pub fn discriminator(&self) -> &str {
        self.state.discriminator()
    }

    pub fn attribute(&self, name: &str) -> Option<&PropertyValue> {
        self.state.attribute(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> &mut Self {
        self.state.set(name, value);
        self
    }

    pub fn to_repr(&self, discriminator_field: &str) -> Value {
        let mut repr = Map::new();
        if let Some(identity) = self.identity() {
            repr.insert("self".to_string(), Value::String(identity.uri().to_string()));
        }
        repr.insert(
            "data".to_string(),
            Value::Object(self.state.data(discriminator_field)),
        );
        Value::Object(repr)
    }
}

impl GraphEntity for Node {
    fn state(&self) -> &PropertyContainer {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PropertyContainer {
        &mut self.state
    }
}

// ── Relationships ────────────────────────────────────────────────

/// One end of a relationship.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// A node instance held in memory, persisted or not.
    Resolved(Box<Node>),
    /// A persisted node known only by identity; loaded on first access.
    Remote(Identity),
    /// A node queued in the current batch.
    Local(LocalId),
}

impl Endpoint {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Endpoint::Resolved(node) => node.identity(),
            Endpoint::Remote(identity) => Some(identity),
            Endpoint::Local(_) => None,
        }
    }

    pub fn key(&self) -> Option<InstanceKey> {
        match self {
            Endpoint::Resolved(node) => Some(node.key()),
            _ => None,
        }
    }
}

impl From<&Node> for Endpoint {
    fn from(node: &Node) -> Self {
        Endpoint::Resolved(Box::new(node.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct Relationship {
    state: PropertyContainer,
    rel_type: Option<String>,
    pub(crate) start: Option<Endpoint>,
    pub(crate) end: Option<Endpoint>,
}

impl Relationship {
    pub(crate) fn from_state(state: PropertyContainer) -> Self {
        Self {
            state,
            rel_type: None,
            start: None,
            end: None,
        }
    }

    pub fn state(&self) -> &PropertyContainer {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PropertyContainer {
        &mut self.state
    }

    pub fn key(&self) -> InstanceKey {
        self.state.key()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.state.identity()
    }

    pub fn is_new(&self) -> bool {
        self.state.is_new()
    }

    pub fn discriminator(&self) -> &str {
        self.state.discriminator()
    }

    pub fn attribute(&self, name: &str) -> Option<&PropertyValue> {
        self.state.attribute(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> &mut Self {
        self.state.set(name, value);
        self
    }

    pub fn rel_type(&self) -> Option<&str> {
        self.rel_type.as_deref()
    }

    /// Set the relationship type. A persisted relationship keeps its type.
    pub fn set_type(&mut self, rel_type: &str) -> Result<()> {
        if rel_type.trim().is_empty() {
            return Err(GraphError::IllegalState("relationship type is empty".to_string()));
        }
        match &self.rel_type {
            Some(current) if current != rel_type && !self.state.is_new() => {
                Err(GraphError::IllegalState(format!(
                    "persisted relationship is a {current}, cannot become a {rel_type}"
                )))
            }
            _ => {
                self.rel_type = Some(rel_type.to_string());
                Ok(())
            }
        }
    }

    pub(crate) fn load_type(&mut self, rel_type: &str) {
        self.rel_type = Some(rel_type.to_string());
    }

    pub fn start(&self) -> Option<&Endpoint> {
        self.start.as_ref()
    }

    pub fn end(&self) -> Option<&Endpoint> {
        self.end.as_ref()
    }

    pub fn set_start(&mut self, endpoint: impl Into<Endpoint>) -> &mut Self {
        self.start = Some(endpoint.into());
        self
    }

    pub fn set_end(&mut self, endpoint: impl Into<Endpoint>) -> &mut Self {
        self.end = Some(endpoint.into());
        self
    }

    /// Set both ends at once.
    pub fn connect(&mut self, start: &Node, end: &Node) -> &mut Self {
        self.set_start(start).set_end(end)
    }

    pub fn to_repr(&self, discriminator_field: &str) -> Value {
        let mut repr = Map::new();
        if let Some(identity) = self.identity() {
            repr.insert("self".to_string(), Value::String(identity.uri().to_string()));
        }
        repr.insert(
            "data".to_string(),
            Value::Object(self.state.data(discriminator_field)),
        );
        if let Some(rel_type) = self.rel_type() {
            repr.insert("type".to_string(), Value::String(rel_type.to_string()));
        }
        let ends = [("start", &self.start), ("end", &self.end)];
        for (name, endpoint) in ends {
            if let Some(identity) = endpoint.as_ref().and_then(Endpoint::identity) {
                repr.insert(name.to_string(), Value::String(identity.uri().to_string()));
            }
        }
        Value::Object(repr)
    }
}

impl GraphEntity for Relationship {
    fn state(&self) -> &PropertyContainer {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PropertyContainer {
        &mut self.state
    }

    fn as_relationship(&self) -> Option<&Relationship> {
        Some(self)
    }

    fn as_relationship_mut(&mut self) -> Option<&mut Relationship> {
        Some(self)
    }
}

// ── Entities and paths ───────────────────────────────────────────

/// A materialized container of either kind.
#[derive(Debug, Clone)]
pub enum Entity {
    Node(Node),
    Relationship(Relationship),
}

impl Entity {
    pub fn discriminator(&self) -> &str {
        GraphEntity::state(self).discriminator()
    }

    pub fn identity(&self) -> Option<&Identity> {
        GraphEntity::state(self).identity()
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Entity::Node(node) => Some(node),
            Entity::Relationship(_) => None,
        }
    }

    pub fn into_node(self) -> Option<Node> {
        match self {
            Entity::Node(node) => Some(node),
            Entity::Relationship(_) => None,
        }
    }

    pub fn into_relationship(self) -> Option<Relationship> {
        match self {
            Entity::Relationship(relationship) => Some(relationship),
            Entity::Node(_) => None,
        }
    }

    pub fn to_repr(&self, discriminator_field: &str) -> Value {
        match self {
            Entity::Node(node) => node.to_repr(discriminator_field),
            Entity::Relationship(relationship) => relationship.to_repr(discriminator_field),
        }
    }
}

impl GraphEntity for Entity {
    fn state(&self) -> &PropertyContainer {
        match self {
            Entity::Node(node) => &node.state,
            Entity::Relationship(relationship) => &relationship.state,
        }
    }

    fn state_mut(&mut self) -> &mut PropertyContainer {
        match self {
            Entity::Node(node) => &mut node.state,
            Entity::Relationship(relationship) => &mut relationship.state,
        }
    }

    fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Entity::Relationship(relationship) => Some(relationship),
            Entity::Node(_) => None,
        }
    }

    fn as_relationship_mut(&mut self) -> Option<&mut Relationship> {
        match self {
            Entity::Relationship(relationship) => Some(relationship),
            Entity::Node(_) => None,
        }
    }
}

/// An ordered walk of alternating nodes and relationships.
#[derive(Debug, Clone, Default)]
pub struct Path {
    items: Vec<Entity>,
}

impl Path {
    pub fn new(items: Vec<Entity>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[Entity] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.items.iter().filter_map(Entity::as_node)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.items.iter().filter_map(|item| item.as_relationship())
    }

    pub fn into_items(self) -> Vec<Entity> {
        self.items
    }
}
