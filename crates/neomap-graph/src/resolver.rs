//! Lazy resolution of declared relations and relationship endpoints.
//!
//! A relation is resolved on first access by running its query fragment
//! anchored at the node's id, and the result is cached on the instance until
//! refreshed. Unsaved nodes have nothing to traverse: they get an empty
//! result without a request, and nothing is cached.

use std::collections::hash_map::Entry as MapEntry;
use std::slice;

use serde_json::Value;

use crate::client::GraphClient;
use crate::entity::{Endpoint, Entity, Node, Path, Relationship};
use crate::error::{GraphError, Result};
use crate::materialize::Materializer;
use crate::schema::{Cardinality, RelationDef, RelationTarget, GENERIC_NODE, GENERIC_RELATIONSHIP};
use crate::script::GremlinScript;

/// One element of a relation result.
#[derive(Debug, Clone)]
pub enum RelationItem {
    Entity(Entity),
    Path(Path),
}

impl RelationItem {
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            RelationItem::Entity(entity) => Some(entity),
            RelationItem::Path(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        self.as_entity().and_then(Entity::as_node)
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            RelationItem::Path(path) => Some(path),
            RelationItem::Entity(_) => None,
        }
    }
}

/// The value of a resolved relation, shaped by its cardinality.
#[derive(Debug, Clone)]
pub enum RelationResult {
    One(Option<RelationItem>),
    Many(Vec<RelationItem>),
}

static EMPTY_ONE: RelationResult = RelationResult::One(None);
static EMPTY_MANY: RelationResult = RelationResult::Many(Vec::new());

impl RelationResult {
    fn empty(cardinality: Cardinality) -> &'static RelationResult {
        match cardinality {
            Cardinality::One => &EMPTY_ONE,
            Cardinality::Many => &EMPTY_MANY,
        }
    }

    fn collect(items: Vec<RelationItem>, cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::One => RelationResult::One(items.into_iter().next()),
            Cardinality::Many => RelationResult::Many(items),
        }
    }

    /// The single item of a to-one relation, or the first of a to-many one.
    pub fn one(&self) -> Option<&RelationItem> {
        self.items().first()
    }

    pub fn items(&self) -> &[RelationItem] {
        match self {
            RelationResult::One(Some(item)) => slice::from_ref(item),
            RelationResult::One(None) => &[],
            RelationResult::Many(items) => items,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.items().iter().filter_map(RelationItem::as_node)
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

impl Node {
    /// Resolve a declared relation, loading it on first access.
    pub fn relation(&mut self, client: &GraphClient, name: &str) -> Result<&RelationResult> {
        if self.relations.contains_key(name) {
            return Ok(&self.relations[name]);
        }
        self.load_relation(client, name)
    }

    /// Discard any cached value and load the relation again.
    pub fn refresh_relation(&mut self, client: &GraphClient, name: &str) -> Result<&RelationResult> {
        self.relations.remove(name);
        self.load_relation(client, name)
    }

    /// The cached value of a relation, without loading it.
    pub fn cached_relation(&self, name: &str) -> Option<&RelationResult> {
        self.relations.get(name)
    }

    pub fn clear_relations(&mut self) {
        self.relations.clear();
    }

    fn load_relation(&mut self, client: &GraphClient, name: &str) -> Result<&RelationResult> {
        let metadata = client.registry().metadata(self.discriminator())?;
        let relation = metadata.relation(name).cloned().ok_or_else(|| {
            GraphError::Configuration(format!(
                "{} declares no relation {name:?}",
                self.discriminator()
            ))
        })?;

        let identity = match self.identity() {
            Some(identity) if !self.is_new() => identity.clone(),
            _ => {
                tracing::trace!(relation = %name, "Unsaved node, relation is empty");
                return Ok(RelationResult::empty(relation.cardinality));
            }
        };

        let script = GremlinScript::anchored(identity.id(), &relation.fragment);
        let data = client.execute_script(&script)?;
        let result = relation_result(&client.materializer(), &relation, &data);
        tracing::debug!(
            node = %identity,
            relation = %name,
            items = result.len(),
            "Relation resolved"
        );

        match self.relations.entry(name.to_string()) {
            MapEntry::Occupied(mut cached) => {
                cached.insert(result);
                Ok(cached.into_mut())
            }
            MapEntry::Vacant(slot) => Ok(slot.insert(result)),
        }
    }
}

fn relation_result(materializer: &Materializer<'_>, relation: &RelationDef, data: &Value) -> RelationResult {
    let raw: Vec<&Value> = match data {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        single => vec![single],
    };

    let items = raw
        .into_iter()
        .filter_map(|item| match relation.target {
            RelationTarget::Node => materializer
                .materialize(item, GENERIC_NODE)
                .map(RelationItem::Entity),
            RelationTarget::Relationship => materializer
                .materialize(item, GENERIC_RELATIONSHIP)
                .map(RelationItem::Entity),
            RelationTarget::Path => materializer.materialize_path(item).map(RelationItem::Path),
        })
        .collect();

    RelationResult::collect(items, relation.cardinality)
}

impl Relationship {
    /// The start node, fetched on first access when only its identity is known.
    pub fn start_node(&mut self, client: &GraphClient) -> Result<&Node> {
        resolve_endpoint(&mut self.start, "start", client)
    }

    /// The end node, fetched on first access when only its identity is known.
    pub fn end_node(&mut self, client: &GraphClient) -> Result<&Node> {
        resolve_endpoint(&mut self.end, "end", client)
    }
}

fn resolve_endpoint<'a>(
    slot: &'a mut Option<Endpoint>,
    which: &str,
    client: &GraphClient,
) -> Result<&'a Node> {
    let endpoint = slot
        .as_mut()
        .ok_or_else(|| GraphError::IllegalState(format!("relationship has no {which} node")))?;

    let remote = match endpoint {
        Endpoint::Resolved(_) => None,
        Endpoint::Remote(identity) => Some(identity.clone()),
        Endpoint::Local(local_id) => {
            return Err(GraphError::IllegalState(format!(
                "{which} node {local_id} is only queued in a batch"
            )))
        }
    };

    if let Some(identity) = remote {
        let repr = client.fetch(&identity)?;
        let node = client
            .materializer()
            .materialize(&repr, GENERIC_NODE)
            .and_then(Entity::into_node)
            .ok_or_else(|| GraphError::NotFound {
                what: format!("{which} node {identity}"),
            })?;
        tracing::trace!(node = %identity, which = %which, "Endpoint loaded");
        *endpoint = Endpoint::Resolved(Box::new(node));
    }

    match endpoint {
        Endpoint::Resolved(node) => Ok(&**node),
        _ => Err(GraphError::IllegalState(format!(
            "{which} node could not be resolved"
        ))),
    }
}
