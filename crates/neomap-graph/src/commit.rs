//! Batch submission and result correlation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use neomap_core::{Identity, InstanceKey, LocalId};
use serde_json::Value;
use uuid::Uuid;

use crate::batch::BatchTransaction;
use crate::entity::{Endpoint, Relationship};
use crate::error::{GraphError, Result};
use crate::transport::Method;

/// Outcome of an executed batch.
#[derive(Debug, Clone)]
pub struct BatchReceipt {
    pub transaction_id: Uuid,
    /// `None` when the batch was empty and nothing was sent.
    pub submitted_at: Option<DateTime<Utc>>,
    pub operation_count: usize,
    /// Containers that received an identity from this batch.
    pub committed: usize,
    /// Raw per-operation results, in submission order.
    pub results: Vec<Value>,
}

impl BatchReceipt {
    pub fn is_empty(&self) -> bool {
        self.submitted_at.is_none()
    }
}

/// One correlated result, checked before anything is applied.
struct Outcome<'r> {
    local_id: LocalId,
    identity: Option<Identity>,
    body: Option<&'r Value>,
}

impl<'a> BatchTransaction<'a> {
    /// Submit the batch in one request and apply the results.
    ///
    /// An empty batch succeeds without a request. Local ids are cleared from
    /// every queued container before submission, whatever the outcome. On
    /// success each created container receives the identity reported for its
    /// operation, and relationships queued in the batch learn the identities
    /// of endpoints created alongside them.
    pub fn execute(mut self) -> Result<BatchReceipt> {
        let operation_count = self.operations.len();
        if operation_count == 0 {
            tracing::debug!(transaction = %self.id, "Empty batch, nothing to submit");
            return Ok(BatchReceipt {
                transaction_id: self.id,
                submitted_at: None,
                operation_count,
                committed: 0,
                results: Vec::new(),
            });
        }

        for instance in self.instances.values_mut() {
            instance.state_mut().set_local_id(None);
        }

        if self.client.mapping().auto_create_indexes {
            self.ensure_indexes()?;
        }

        let body = serde_json::to_value(&self.operations)?;
        let submitted_at = Utc::now();
        tracing::debug!(transaction = %self.id, operations = operation_count, "Submitting batch");
        let response = self
            .client
            .transport()
            .request(Method::Post, "/batch", Some(&body))
            .map_err(|source| GraphError::TransactionFailed {
                message: format!("batch {} was rejected", self.id),
                source: Some(source),
            })?;

        let results = match response.data {
            Value::Array(results) => results,
            other => {
                return Err(GraphError::transaction(format!(
                    "batch {} returned {} instead of a result list",
                    self.id,
                    json_kind(&other)
                )))
            }
        };

        let outcomes = self.correlate(&results)?;
        let mut committed: HashMap<InstanceKey, Identity> = HashMap::new();
        for outcome in outcomes {
            let Some(instance) = self.instances.get_mut(&outcome.local_id) else {
                continue;
            };
            if self.deleted.contains(&outcome.local_id) {
                instance.state_mut().detach();
                continue;
            }
            let Some(identity) = outcome.identity else {
                continue;
            };
            if let Some(relationship) = instance.as_relationship_mut() {
                adopt_reported_endpoints(relationship, outcome.body);
            }
            instance.state_mut().commit_identity(identity.clone());
            committed.insert(instance.state().key(), identity);
        }

        for instance in self.instances.values_mut() {
            if let Some(relationship) = instance.as_relationship_mut() {
                propagate_identities(relationship, &committed);
            }
        }

        tracing::info!(
            transaction = %self.id,
            operations = operation_count,
            committed = committed.len(),
            "Batch committed"
        );
        Ok(BatchReceipt {
            transaction_id: self.id,
            submitted_at: Some(submitted_at),
            operation_count,
            committed: committed.len(),
            results,
        })
    }

    /// Match results to queued containers by correlation id. Fails before
    /// any container is touched when a result cannot be attributed.
    fn correlate<'r>(&self, results: &'r [Value]) -> Result<Vec<Outcome<'r>>> {
        let mut outcomes = Vec::new();
        for result in results {
            let Some(id) = result.get("id").and_then(Value::as_u64) else {
                continue;
            };
            let local_id = LocalId(id);
            if !self.instances.contains_key(&local_id) {
                return Err(GraphError::transaction(format!(
                    "batch {} reported result {local_id} for no queued container",
                    self.id
                )));
            }

            let body = result.get("body");
            let identity = match body.and_then(|b| b.get("self")).and_then(Value::as_str) {
                Some(location) => Some(Identity::parse(location).map_err(|err| {
                    GraphError::transaction(format!(
                        "batch {} result {local_id}: {err}",
                        self.id
                    ))
                })?),
                None => None,
            };

            outcomes.push(Outcome {
                local_id,
                identity,
                body,
            });
        }

        for local_id in self.created_ids() {
            let reported = outcomes
                .iter()
                .any(|outcome| outcome.local_id == local_id && outcome.identity.is_some());
            if !reported {
                return Err(GraphError::transaction(format!(
                    "batch {} reported no location for created container {local_id}",
                    self.id
                )));
            }
        }
        Ok(outcomes)
    }

    fn created_ids(&self) -> impl Iterator<Item = LocalId> + '_ {
        self.created.values().copied()
    }

    fn ensure_indexes(&self) -> Result<()> {
        for (kind, name) in self.touched_indexes()? {
            self.client
                .ensure_auto_index(kind, &name)
                .map_err(|err| match err {
                    GraphError::Transport(source) => GraphError::TransactionFailed {
                        message: format!("auto index {name} could not be created"),
                        source: Some(source),
                    },
                    other => GraphError::transaction(format!(
                        "auto index {name} could not be created: {other}"
                    )),
                })?;
        }
        Ok(())
    }
}

/// Replace endpoints that were only known as local ids with the identities
/// the store reported for the created relationship.
fn adopt_reported_endpoints(relationship: &mut Relationship, body: Option<&Value>) {
    let Some(body) = body else {
        return;
    };
    let reported = |key: &str| {
        body.get(key)
            .and_then(Value::as_str)
            .and_then(|uri| Identity::parse(uri).ok())
    };
    for (slot, key) in [(&mut relationship.start, "start"), (&mut relationship.end, "end")] {
        let replace = matches!(slot, None | Some(Endpoint::Local(_)));
        if replace {
            if let Some(identity) = reported(key) {
                *slot = Some(Endpoint::Remote(identity));
            }
        }
    }
}

/// Give in-memory endpoint copies the identities committed in this batch.
fn propagate_identities(relationship: &mut Relationship, committed: &HashMap<InstanceKey, Identity>) {
    for slot in [&mut relationship.start, &mut relationship.end] {
        if let Some(Endpoint::Resolved(node)) = slot {
            if node.identity().is_none() {
                if let Some(identity) = committed.get(&node.key()) {
                    node.state_mut().commit_identity(identity.clone());
                }
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GraphClient;
    use crate::schema::{EntityDefinition, SchemaRegistry};
    use crate::transport::{ScriptedTransport, TransportError};
    use neomap_core::{GraphConfig, MappingConfig};
    use serde_json::json;
    use std::sync::Arc;

    fn client(auto_create_indexes: bool) -> (GraphClient, Arc<ScriptedTransport>) {
        let mapping = MappingConfig {
            auto_create_indexes,
            ..Default::default()
        };
        let mut registry = SchemaRegistry::new(mapping);
        registry
            .register(EntityDefinition::node("Person").property("name"))
            .register(EntityDefinition::relationship("Knows"));
        let transport = Arc::new(ScriptedTransport::new());
        let client = GraphClient::with_transport(transport.clone(), registry, GraphConfig::default());
        (client, transport)
    }

    #[test]
    fn empty_batch_sends_nothing() {
        let (client, transport) = client(true);
        let receipt = client.transaction().execute().unwrap();
        assert!(receipt.is_empty());
        assert_eq!(receipt.operation_count, 0);
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn created_node_receives_its_identity() {
        let (client, transport) = client(false);
        let mut person = client.registry().new_node("Person").unwrap();
        person.set("name", "Ada");
        transport.push_reply(json!([
            {"id": 0, "location": "http://h/db/data/node/31", "body": {"self": "http://h/db/data/node/31", "data": {"name": "Ada"}}},
            {"location": "http://h/db/data/index/node/x/name/Ada/31"},
            {"location": "http://h/db/data/index/node/x/modelclass/Person/31"},
        ]));

        let mut tx = client.transaction();
        tx.add_save_operation(&mut person, true).unwrap();
        let receipt = tx.execute().unwrap();

        assert_eq!(receipt.committed, 1);
        assert_eq!(receipt.operation_count, 3);
        assert!(!person.is_new());
        assert_eq!(person.identity().map(Identity::id), Some("31"));
        assert!(person.state().local_id().is_none());

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path, "/batch");
        assert_eq!(sent[0].body.as_ref().map(|b| b[0]["id"].clone()), Some(json!(0)));
    }

    #[test]
    fn auto_indexes_are_ensured_once_per_client() {
        let (client, transport) = client(true);
        let mut first = client.registry().new_node("Person").unwrap();
        let mut second = client.registry().new_node("Person").unwrap();

        transport.push_reply(json!({}));
        transport.push_reply(json!([{"id": 0, "body": {"self": "http://h/db/data/node/1"}}]));
        let mut tx = client.transaction();
        tx.add_save_operation(&mut first, false).unwrap();
        tx.execute().unwrap();

        transport.push_reply(json!([{"id": 0, "body": {"self": "http://h/db/data/node/2"}}]));
        let mut tx = client.transaction();
        tx.add_save_operation(&mut second, false).unwrap();
        tx.execute().unwrap();

        let sent = transport.requests();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].path, "/index/node");
        assert_eq!(
            sent[0].body,
            Some(json!({"name": "neomap_node_autoindex", "config": {"type": "fulltext", "provider": "lucene"}}))
        );
        assert_eq!(sent[2].path, "/batch");
    }

    #[test]
    fn transport_failure_clears_local_ids_and_keeps_containers_new() {
        let (client, transport) = client(false);
        let mut person = client.registry().new_node("Person").unwrap();
        transport.push_error(TransportError::Request {
            method: Method::Post,
            path: "/batch".to_string(),
            status: Some(500),
            message: "boom".to_string(),
        });

        let mut tx = client.transaction();
        tx.add_save_operation(&mut person, false).unwrap();
        let err = tx.execute().unwrap_err();

        assert!(matches!(err, GraphError::TransactionFailed { source: Some(_), .. }));
        assert!(person.is_new());
        assert!(person.identity().is_none());
        assert!(person.state().local_id().is_none());
    }

    #[test]
    fn unattributable_results_fail_before_applying() {
        let (client, transport) = client(false);
        let mut person = client.registry().new_node("Person").unwrap();
        transport.push_reply(json!([
            {"id": 0, "body": {"self": "http://h/db/data/node/4"}},
            {"id": 9, "body": {"self": "http://h/db/data/node/5"}},
        ]));

        let mut tx = client.transaction();
        tx.add_save_operation(&mut person, false).unwrap();
        assert!(matches!(
            tx.execute(),
            Err(GraphError::TransactionFailed { source: None, .. })
        ));
        assert!(person.is_new());
    }

    #[test]
    fn missing_location_for_a_create_fails() {
        let (client, transport) = client(false);
        let mut person = client.registry().new_node("Person").unwrap();
        transport.push_reply(json!([{"id": 0, "body": null}]));

        let mut tx = client.transaction();
        tx.add_save_operation(&mut person, false).unwrap();
        assert!(tx.execute().is_err());
        assert!(person.is_new());
    }

    #[test]
    fn non_list_response_fails() {
        let (client, transport) = client(false);
        let mut person = client.registry().new_node("Person").unwrap();
        transport.push_reply(json!({"message": "nope"}));

        let mut tx = client.transaction();
        tx.add_save_operation(&mut person, false).unwrap();
        let err = tx.execute().unwrap_err();
        assert!(err.to_string().contains("an object"));
    }

    #[test]
    fn endpoints_learn_identities_from_the_batch() {
        let (client, transport) = client(false);
        let mut a = client.registry().new_node("Person").unwrap();
        let mut b = client.registry().new_node("Person").unwrap();
        let mut knows = client.registry().new_relationship("Knows", "KNOWS").unwrap();
        knows.connect(&a, &b);

        transport.push_reply(json!([
            {"id": 0, "body": {"self": "http://h/db/data/node/1"}},
            {},
            {"id": 2, "body": {"self": "http://h/db/data/node/2"}},
            {},
            {"id": 4, "body": {
                "self": "http://h/db/data/relationship/9",
                "start": "http://h/db/data/node/1",
                "end": "http://h/db/data/node/2",
                "type": "KNOWS",
            }},
        ]));

        let mut tx = client.transaction();
        tx.add_save_operation(&mut a, false).unwrap();
        tx.add_save_operation(&mut b, false).unwrap();
        tx.add_save_operation(&mut knows, false).unwrap();
        let receipt = tx.execute().unwrap();

        assert_eq!(receipt.committed, 3);
        assert_eq!(knows.identity().map(Identity::id), Some("9"));
        assert_eq!(
            knows.start().and_then(Endpoint::identity).map(Identity::id),
            Some("1")
        );
        assert_eq!(
            knows.end().and_then(Endpoint::identity).map(Identity::id),
            Some("2")
        );
        assert_eq!(a.identity().map(Identity::id), Some("1"));
    }

    #[test]
    fn deleted_containers_are_detached() {
        let (client, transport) = client(false);
        let mut person = client
            .materializer()
            .materialize(
                &json!({"self": "http://h/db/data/node/3", "data": {"modelclass": "Person"}}),
                "Person",
            )
            .and_then(crate::entity::Entity::into_node)
            .unwrap();
        transport.push_reply(json!([{}, {"id": 1}]));

        let mut tx = client.transaction();
        tx.add_delete_operation(&mut person).unwrap();
        tx.execute().unwrap();
        assert!(person.is_new());
        assert!(person.identity().is_none());
    }
}
