//! Read operations: finders, index queries, traversals, scripts.
//!
//! Finders are scoped to one registered type. Lookups against a shared auto
//! index are narrowed to that type by its discriminator, except for the
//! generic types, which accept every container of their kind.

use serde_json::Value;

use crate::client::GraphClient;
use crate::entity::{Entity, Node, Relationship};
use crate::error::{GraphError, Result};
use crate::index::{encode_segment, lookup_path};
use crate::schema::{GENERIC_NODE, GENERIC_RELATIONSHIP};
use crate::script::{QuerySource, ScriptLanguage};
use crate::traversal::{Direction, PathReference, TraversalDescription, TraversalReturn};
use crate::transport::Method;

/// Result of a server-side traversal, shaped by its return type.
#[derive(Debug, Clone)]
pub enum Traversal {
    Nodes(Vec<Node>),
    Relationships(Vec<Relationship>),
    Paths(Vec<PathReference>),
}

impl Traversal {
    pub fn len(&self) -> usize {
        match self {
            Traversal::Nodes(nodes) => nodes.len(),
            Traversal::Relationships(relationships) => relationships.len(),
            Traversal::Paths(paths) => paths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_generic(discriminator: &str) -> bool {
    discriminator == GENERIC_NODE || discriminator == GENERIC_RELATIONSHIP
}

impl GraphClient {
    // ── Finders ──────────────────────────────────────────────────

    /// Load one container of the given type by its numeric id. A container
    /// that is missing or stored as another type yields `None`.
    pub fn find_by_id(&self, discriminator: &str, id: &str) -> Result<Option<Entity>> {
        let metadata = self.registry().metadata(discriminator)?;
        let path = format!("/{}/{}", metadata.kind().resource(), encode_segment(id));

        let repr = match self.request(Method::Get, &path, None) {
            Ok(repr) => repr,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        let found = self
            .materializer()
            .materialize(&repr, discriminator)
            .filter(|entity| is_generic(discriminator) || entity.discriminator() == discriminator);
        tracing::debug!(discriminator = %discriminator, id = %id, found = found.is_some(), "Find by id");
        Ok(found)
    }

    /// Exact-match lookup of `key = value` in the type's auto index.
    pub fn find_by_index(&self, discriminator: &str, key: &str, value: &str) -> Result<Vec<Entity>> {
        let metadata = self.registry().metadata(discriminator)?;
        let path = lookup_path(&metadata, key, value);
        let reprs = self.request_list(&path)?;
        Ok(self.narrow(discriminator, &reprs))
    }

    /// Every container stored as the given type.
    pub fn find_all(&self, discriminator: &str) -> Result<Vec<Entity>> {
        let field = self.mapping().discriminator_field.clone();
        self.find_by_index(discriminator, &field, discriminator)
    }

    /// Full-text query against the type's auto index.
    pub fn query_index(&self, discriminator: &str, query: &str, limit: Option<usize>) -> Result<Vec<Entity>> {
        let metadata = self.registry().metadata(discriminator)?;
        let scoped = if is_generic(discriminator) {
            query.to_string()
        } else {
            format!(
                "({query}) AND {}:{discriminator}",
                self.mapping().discriminator_field
            )
        };
        let path = format!("{}?query={}", metadata.index_path(), encode_segment(&scoped));
        let reprs = self.request_list(&path)?;

        let mut found = self.narrow(discriminator, &reprs);
        if let Some(limit) = limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    /// Relationships attached to a persisted node, optionally restricted to types.
    pub fn relationships_of(&self, node: &Node, direction: Direction, types: &[&str]) -> Result<Vec<Relationship>> {
        let Some(identity) = node.identity().filter(|_| !node.is_new()) else {
            return Ok(Vec::new());
        };

        let mut path = format!("/node/{}/relationships/{}", identity.id(), direction.as_str());
        if !types.is_empty() {
            let encoded: Vec<String> = types.iter().map(|t| encode_segment(t)).collect();
            path.push('/');
            path.push_str(&encoded.join("&"));
        }

        let reprs = self.request_list(&path)?;
        Ok(self
            .materializer()
            .materialize_all(&reprs, GENERIC_RELATIONSHIP)
            .into_iter()
            .filter_map(Entity::into_relationship)
            .collect())
    }

    /// Run a server-side traversal from a persisted node.
    pub fn traverse(&self, node: &Node, description: &TraversalDescription) -> Result<Traversal> {
        let identity = node
            .identity()
            .filter(|_| !node.is_new())
            .ok_or_else(|| GraphError::IllegalState("cannot traverse from an unsaved node".to_string()))?;

        let returns = description.return_type();
        let path = format!("/node/{}/traverse/{}", identity.id(), returns.segment());
        let body = serde_json::to_value(description)?;
        let data = self.request(Method::Post, &path, Some(&body))?;
        let items = match data {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };

        let materializer = self.materializer();
        let traversal = match returns {
            TraversalReturn::Nodes => Traversal::Nodes(
                materializer
                    .materialize_all(&items, GENERIC_NODE)
                    .into_iter()
                    .filter_map(Entity::into_node)
                    .collect(),
            ),
            TraversalReturn::Relationships => Traversal::Relationships(
                materializer
                    .materialize_all(&items, GENERIC_RELATIONSHIP)
                    .into_iter()
                    .filter_map(Entity::into_relationship)
                    .collect(),
            ),
            TraversalReturn::Paths => Traversal::Paths(
                items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<std::result::Result<_, _>>()?,
            ),
        };
        tracing::debug!(node = %identity, returned = traversal.len(), "Traversal complete");
        Ok(traversal)
    }

    // ── Scripts ──────────────────────────────────────────────────

    /// Send a script to its language's endpoint and return the raw result.
    pub fn execute_script(&self, source: &dyn QuerySource) -> Result<Value> {
        let endpoint = match source.language() {
            ScriptLanguage::Gremlin => self.config().gremlin_path.clone(),
            ScriptLanguage::Cypher => self.config().cypher_path.clone(),
        };
        tracing::trace!(script = %source.to_script_string(), "Executing script");
        self.request(Method::Post, &endpoint, Some(&source.request_body()))
    }

    /// Run a script and materialize every container representation in its
    /// result, including those nested in Cypher result rows.
    pub fn query_entities(&self, source: &dyn QuerySource, fallback: &str) -> Result<Vec<Entity>> {
        let data = self.execute_script(source)?;
        let mut reprs = Vec::new();
        collect_representations(&data, &mut reprs);
        Ok(self.materializer().materialize_all(reprs, fallback))
    }

    fn request_list(&self, path: &str) -> Result<Vec<Value>> {
        match self.request(Method::Get, path, None) {
            Ok(Value::Array(items)) => Ok(items),
            Ok(Value::Null) => Ok(Vec::new()),
            Ok(other) => Err(GraphError::IllegalState(format!(
                "expected a list from {path}, got {other}"
            ))),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    fn narrow(&self, discriminator: &str, reprs: &[Value]) -> Vec<Entity> {
        let mut found = self.materializer().materialize_all(reprs, discriminator);
        if !is_generic(discriminator) {
            found.retain(|entity| entity.discriminator() == discriminator);
        }
        found
    }
}

fn collect_representations<'v>(value: &'v Value, out: &mut Vec<&'v Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_representations(item, out);
            }
        }
        Value::Object(object) if object.contains_key("self") => out.push(value),
        Value::Object(object) => {
            if let Some(rows) = object.get("data") {
                collect_representations(rows, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityDefinition, SchemaRegistry};
    use crate::script::{CypherQuery, GremlinScript};
    use crate::transport::{ScriptedTransport, TransportError};
    use crate::traversal::TraversalOrder;
    use neomap_core::{GraphConfig, MappingConfig};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn client() -> (GraphClient, Arc<ScriptedTransport>) {
        let mut registry = SchemaRegistry::new(MappingConfig::default());
        registry
            .register(EntityDefinition::node("Person").property("name"))
            .register(EntityDefinition::node("Company").property("name"))
            .register(EntityDefinition::relationship("Knows"));
        let transport = Arc::new(ScriptedTransport::new());
        let client = GraphClient::with_transport(transport.clone(), registry, GraphConfig::default());
        (client, transport)
    }

    fn person(id: u32, name: &str) -> Value {
        json!({"self": format!("http://h/db/data/node/{id}"), "data": {"modelclass": "Person", "name": name}})
    }

    fn persisted(client: &GraphClient, id: u32) -> Node {
        client
            .materializer()
            .materialize(&person(id, "x"), GENERIC_NODE)
            .and_then(Entity::into_node)
            .unwrap()
    }

    #[test]
    fn find_by_id_checks_the_stored_type() {
        let (client, transport) = client();
        transport.push_reply(person(4, "Ada"));
        transport.push_reply(person(5, "Bob"));
        transport.push_error(TransportError::NotFound {
            path: "/node/6".to_string(),
        });

        let found = client.find_by_id("Person", "4").unwrap().unwrap();
        assert_eq!(found.identity().map(|i| i.id()), Some("4"));
        assert!(client.find_by_id("Company", "5").unwrap().is_none());
        assert!(client.find_by_id("Person", "6").unwrap().is_none());
        assert_eq!(transport.requests()[0].path, "/node/4");
    }

    #[test]
    fn generic_finder_accepts_any_node() {
        let (client, transport) = client();
        transport.push_reply(person(4, "Ada"));
        let found = client.find_by_id(GENERIC_NODE, "4").unwrap().unwrap();
        assert_eq!(found.discriminator(), "Person");
    }

    #[test]
    fn index_lookups_are_narrowed_to_the_type() {
        let (client, transport) = client();
        transport.push_reply(json!([
            person(1, "Ada"),
            {"self": "http://h/db/data/node/2", "data": {"modelclass": "Company", "name": "Ada"}},
        ]));

        let found = client.find_by_index("Person", "name", "Ada Lovelace").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            transport.requests()[0].path,
            "/index/node/neomap_node_autoindex/name/Ada+Lovelace"
        );
    }

    #[test]
    fn find_all_uses_the_discriminator_entry() {
        let (client, transport) = client();
        transport.push_error(TransportError::NotFound {
            path: "x".to_string(),
        });
        assert!(client.find_all("Person").unwrap().is_empty());
        assert_eq!(
            transport.requests()[0].path,
            "/index/node/neomap_node_autoindex/modelclass/Person"
        );
    }

    #[test]
    fn query_index_scopes_and_limits() {
        let (client, transport) = client();
        transport.push_reply(json!([person(1, "a"), person(2, "b"), person(3, "c")]));
        let found = client.query_index("Person", "name:a*", Some(2)).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(
            transport.requests()[0].path,
            "/index/node/neomap_node_autoindex?query=%28name%3Aa*%29+AND+modelclass%3APerson"
        );
    }

    #[test]
    fn relationships_of_builds_the_filter_path() {
        let (client, transport) = client();
        let node = persisted(&client, 5);
        transport.push_reply(json!([{
            "self": "http://h/db/data/relationship/1",
            "type": "KNOWS",
            "start": "http://h/db/data/node/5",
            "end": "http://h/db/data/node/6",
            "data": {"modelclass": "Knows"},
        }]));

        let relationships = client
            .relationships_of(&node, Direction::Out, &["KNOWS", "LIKES"])
            .unwrap();
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].discriminator(), "Knows");
        assert_eq!(
            transport.requests()[0].path,
            "/node/5/relationships/out/KNOWS&LIKES"
        );

        let unsaved = client.registry().new_node("Person").unwrap();
        assert!(client
            .relationships_of(&unsaved, Direction::All, &[])
            .unwrap()
            .is_empty());
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn traverse_posts_the_description() {
        let (client, transport) = client();
        let node = persisted(&client, 5);
        transport.push_reply(json!([person(6, "b"), person(7, "c")]));

        let description = TraversalDescription::new()
            .order(TraversalOrder::BreadthFirst)
            .max_depth(2);
        let traversal = client.traverse(&node, &description).unwrap();
        assert!(matches!(&traversal, Traversal::Nodes(nodes) if nodes.len() == 2));

        let sent = &transport.requests()[0];
        assert_eq!(sent.path, "/node/5/traverse/node");
        assert_eq!(sent.body, Some(json!({"order": "breadth first", "max depth": 2})));
    }

    #[test]
    fn traverse_paths_returns_references() {
        let (client, transport) = client();
        let node = persisted(&client, 5);
        transport.push_reply(json!([{
            "start": "http://h/db/data/node/5",
            "end": "http://h/db/data/node/6",
            "nodes": ["http://h/db/data/node/5", "http://h/db/data/node/6"],
            "relationships": ["http://h/db/data/relationship/1"],
            "length": 1,
        }]));
        let description = TraversalDescription::new().returns(TraversalReturn::Paths);
        match client.traverse(&node, &description).unwrap() {
            Traversal::Paths(paths) => assert_eq!(paths[0].length, 1),
            other => panic!("unexpected traversal {other:?}"),
        }
    }

    #[test]
    fn scripts_go_to_their_endpoints() {
        let (client, transport) = client();
        client.execute_script(&GremlinScript::new("g.v(0)")).unwrap();
        client.execute_script(&CypherQuery::new("START n=node(0) RETURN n")).unwrap();
        let sent = transport.requests();
        assert_eq!(sent[0].path, "ext/GremlinPlugin/graphdb/execute_script");
        assert_eq!(sent[1].path, "ext/CypherPlugin/graphdb/execute_query");
    }

    #[test]
    fn query_entities_flattens_cypher_rows() {
        let (client, transport) = client();
        transport.push_reply(json!({
            "columns": ["a", "b"],
            "data": [[person(1, "a"), 3], [person(2, "b"), 4]],
        }));
        let found = client
            .query_entities(&CypherQuery::new("START n=node(*) RETURN n, 1"), GENERIC_NODE)
            .unwrap();
        let names: Vec<_> = found
            .iter()
            .filter_map(Entity::as_node)
            .filter_map(|n| n.attribute("name").and_then(|v| v.as_str()))
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
