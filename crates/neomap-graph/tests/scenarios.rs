//! End-to-end behaviour of the mapping engine against a scripted store.

use std::sync::Arc;

use neomap_core::{GraphConfig, Identity, MappingConfig, PropertyValue};
use neomap_graph::{
    BatchOperation, Endpoint, Entity, EntityDefinition, GraphClient, GraphError, Method, Model,
    Node, RelationDef, RelationItem, RelationResult, RelationTarget, SchemaRegistry,
    ScriptedTransport, GENERIC_NODE,
};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Person {
    name: String,
}

impl Model for Person {
    const DISCRIMINATOR: &'static str = "Person";

    fn definition() -> EntityDefinition {
        EntityDefinition::node(Self::DISCRIMINATOR)
            .property("name")
            .relation(
                "friends",
                RelationDef::has_many(RelationTarget::Node, "out('KNOWS')"),
            )
            .relation(
                "employer",
                RelationDef::has_one(RelationTarget::Node, "out('WORKS_AT')"),
            )
    }
}

fn setup() -> (GraphClient, Arc<ScriptedTransport>) {
    let mapping = MappingConfig {
        auto_create_indexes: false,
        ..Default::default()
    };
    let mut registry = SchemaRegistry::new(mapping);
    registry
        .register_model::<Person>()
        .register(EntityDefinition::relationship("Knows").property("since"));
    let transport = Arc::new(ScriptedTransport::new());
    let client = GraphClient::with_transport(transport.clone(), registry, GraphConfig::default());
    (client, transport)
}

fn load(client: &GraphClient, repr: serde_json::Value) -> Node {
    client
        .materializer()
        .materialize(&repr, GENERIC_NODE)
        .and_then(Entity::into_node)
        .unwrap()
}

#[test]
fn create_two_nodes_and_a_relationship_in_one_batch() {
    let (client, transport) = setup();
    let mut ada = Node::from_model(client.registry(), &Person { name: "Ada".into() }).unwrap();
    let mut bob = Node::from_model(client.registry(), &Person { name: "Bob".into() }).unwrap();
    let mut knows = client.registry().new_relationship("Knows", "KNOWS").unwrap();
    knows.connect(&ada, &bob).set("since", 1843);

    transport.push_reply(json!([
        {"id": 0, "body": {"self": "http://h/db/data/node/10"}},
        {}, {},
        {"id": 3, "body": {"self": "http://h/db/data/node/11"}},
        {}, {},
        {"id": 6, "body": {
            "self": "http://h/db/data/relationship/20",
            "start": "http://h/db/data/node/10",
            "end": "http://h/db/data/node/11",
        }},
        {}, {}, {},
    ]));

    let mut tx = client.transaction();
    tx.add_save_operation(&mut ada, true).unwrap();
    tx.add_save_operation(&mut bob, true).unwrap();
    tx.add_save_operation(&mut knows, true).unwrap();
    let operations: Vec<BatchOperation> = tx.operations().to_vec();
    tx.execute().unwrap();

    let index = "/index/relationship/neomap_relationship_autoindex";
    assert_eq!(
        operations[6..].to_vec(),
        vec![
            BatchOperation::new(Method::Post, "{0}/relationships")
                .with_body(json!({
                    "to": "{3}",
                    "type": "KNOWS",
                    "data": {"modelclass": "Knows", "since": 1843},
                }))
                .with_id(neomap_core::LocalId(6)),
            BatchOperation::new(Method::Post, format!("{index}/since/1843")).with_body(json!("{6}")),
            BatchOperation::new(Method::Post, format!("{index}/modelclass/Knows")).with_body(json!("{6}")),
            BatchOperation::new(Method::Post, format!("{index}/type/KNOWS")).with_body(json!("{6}")),
        ]
    );

    assert_eq!(ada.identity().map(Identity::id), Some("10"));
    assert_eq!(bob.identity().map(Identity::id), Some("11"));
    assert_eq!(knows.identity().map(Identity::id), Some("20"));
    for queued in [ada.state(), bob.state(), knows.state()] {
        assert!(!queued.is_new());
        assert!(queued.local_id().is_none());
    }
    assert_eq!(
        knows.end().and_then(Endpoint::identity).map(Identity::id),
        Some("11")
    );
}

#[test]
fn update_existing_node_reindexes_it() {
    let (client, transport) = setup();
    let mut ada = load(
        &client,
        json!({"self": "http://h/db/data/node/12", "data": {"modelclass": "Person", "name": "Ada"}}),
    );
    ada.set("name", "Augusta");
    transport.push_reply(json!([{"id": 0}, {}, {}, {}, {}]));

    let receipt = client.save(&mut ada).unwrap();
    assert_eq!(receipt.operation_count, 5);
    assert_eq!(receipt.committed, 0);

    let batch = transport.requests().remove(0).body.unwrap();
    let summary: Vec<(String, String)> = batch
        .as_array()
        .unwrap()
        .iter()
        .map(|op| {
            (
                op["method"].as_str().unwrap().to_string(),
                op["to"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("PUT".into(), "/node/12/properties".into()),
            ("DELETE".into(), "/index/node/neomap_node_autoindex/12".into()),
            ("POST".into(), "/index/node/neomap_node_autoindex/name/Augusta".into()),
            ("POST".into(), "/index/node/neomap_node_autoindex/modelclass/Person".into()),
            ("POST".into(), "/index/node/neomap_node_autoindex/id/12".into()),
        ]
    );
    assert_eq!(ada.identity().map(Identity::id), Some("12"));
}

#[test]
fn unregistered_discriminator_falls_back_to_the_finder_type() {
    let (client, transport) = setup();
    transport.push_reply(json!({
        "self": "http://h/db/data/node/3",
        "data": {"modelclass": "Retired", "name": "Old"},
    }));

    let found = client.find_by_id("Person", "3").unwrap().unwrap();
    assert_eq!(found.discriminator(), "Person");
    let person: Person = found.as_node().unwrap().to_model().unwrap();
    assert_eq!(person, Person { name: "Old".into() });
}

#[test]
fn lazy_relations_on_new_and_persisted_nodes() {
    let (client, transport) = setup();

    let mut fresh = client.registry().new_node("Person").unwrap();
    assert!(fresh.relation(&client, "friends").unwrap().is_empty());
    assert!(matches!(
        fresh.relation(&client, "employer").unwrap(),
        RelationResult::One(None)
    ));
    assert_eq!(transport.request_count(), 0);

    let mut ada = load(
        &client,
        json!({"self": "http://h/db/data/node/1", "data": {"modelclass": "Person"}}),
    );
    transport.push_reply(json!([
        {"self": "http://h/db/data/node/2", "data": {"modelclass": "Person", "name": "Bob"}},
    ]));
    let friends = ada.relation(&client, "friends").unwrap();
    let names: Vec<&PropertyValue> = friends
        .items()
        .iter()
        .filter_map(RelationItem::as_node)
        .filter_map(|n| n.attribute("name"))
        .collect();
    assert_eq!(names, vec![&PropertyValue::from("Bob")]);

    ada.relation(&client, "friends").unwrap();
    assert_eq!(transport.request_count(), 1);
    assert_eq!(
        transport.requests()[0].body,
        Some(json!({"script": "g.v(1).out('KNOWS')"}))
    );
}

#[test]
fn failed_batch_leaves_new_containers_new() {
    let (client, transport) = setup();
    let mut ada = Node::from_model(client.registry(), &Person { name: "Ada".into() }).unwrap();
    transport.push_error(neomap_graph::TransportError::Request {
        method: Method::Post,
        path: "/batch".into(),
        status: Some(400),
        message: "bad request".into(),
    });

    let err = client.save(&mut ada).unwrap_err();
    assert!(matches!(err, GraphError::TransactionFailed { .. }));
    assert!(ada.is_new());
    assert!(ada.identity().is_none());
    assert!(ada.state().local_id().is_none());
}
