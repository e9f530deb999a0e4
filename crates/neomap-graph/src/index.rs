//! Auto-index maintenance.
//!
//! Every persisted container is mirrored into its type's auto index: one
//! entry per scalar property, one for the discriminator, and one for the
//! node id (or relationship type). Entries are produced as batch operations
//! so they commit atomically with the change they describe.

use neomap_core::{Identity, LocalId, PropertyValue};
use serde_json::{json, Value};

use crate::batch::BatchOperation;
use crate::entity::GraphEntity;
use crate::error::{GraphError, Result};
use crate::metadata::EntityMetadata;
use crate::schema::SchemaRegistry;
use crate::transport::Method;

/// The persistence transition an entity is going through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTransition {
    Create,
    Update,
    Delete,
}

/// How an index entry refers to the indexed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    /// A container created earlier in the same batch.
    Local(LocalId),
    Remote(Identity),
}

impl EntityRef {
    /// Body of an index-add request: the placeholder or the resource URI.
    pub fn to_body(&self) -> Value {
        match self {
            EntityRef::Local(local_id) => Value::String(local_id.placeholder()),
            EntityRef::Remote(identity) => Value::String(identity.uri().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AutoIndexer<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> AutoIndexer<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Index operations for `entity`, addressed by its local id when it is
    /// queued for creation and by its identity otherwise.
    pub fn operations(
        &self,
        entity: &dyn GraphEntity,
        transition: IndexTransition,
    ) -> Result<Vec<BatchOperation>> {
        let state = entity.state();
        let target = match transition {
            IndexTransition::Create => state
                .local_id()
                .map(EntityRef::Local)
                .or_else(|| state.identity().cloned().map(EntityRef::Remote)),
            IndexTransition::Update | IndexTransition::Delete => {
                state.identity().cloned().map(EntityRef::Remote)
            }
        };
        self.operations_for(entity, transition, target.as_ref())
    }

    pub(crate) fn operations_for(
        &self,
        entity: &dyn GraphEntity,
        transition: IndexTransition,
        target: Option<&EntityRef>,
    ) -> Result<Vec<BatchOperation>> {
        let state = entity.state();
        let metadata = self.registry.metadata(state.discriminator())?;
        let mapping = self.registry.mapping();
        let index_path = metadata.index_path();
        let mut operations = Vec::new();

        if transition != IndexTransition::Create {
            let identity = state.identity().ok_or_else(|| {
                GraphError::IllegalState(format!(
                    "cannot drop index entries of an unsaved {}",
                    state.discriminator()
                ))
            })?;
            operations.push(BatchOperation::new(
                Method::Delete,
                format!("{index_path}/{}", identity.id()),
            ));
        }
        if transition == IndexTransition::Delete {
            return Ok(operations);
        }

        let target = target.ok_or_else(|| {
            GraphError::IllegalState(format!(
                "{} has neither a local id nor an identity to index",
                state.discriminator()
            ))
        })?;

        for (name, value) in state.properties() {
            if *name == mapping.discriminator_field {
                continue;
            }
            match value {
                PropertyValue::Scalar(scalar) => {
                    operations.push(add_entry(&index_path, name, &scalar.index_value(), target));
                }
                PropertyValue::Array(_) => {
                    tracing::trace!(property = %name, "Array property not indexed");
                }
            }
        }
        operations.push(add_entry(
            &index_path,
            &mapping.discriminator_field,
            state.discriminator(),
            target,
        ));

        match entity.as_relationship() {
            Some(relationship) => {
                let rel_type = relationship.rel_type().ok_or_else(|| {
                    GraphError::IllegalState("relationship without a type".to_string())
                })?;
                operations.push(add_entry(&index_path, "type", rel_type, target));
            }
            None => {
                if let Some(identity) = state.identity() {
                    operations.push(add_entry(
                        &index_path,
                        &mapping.identity_index_key,
                        identity.id(),
                        target,
                    ));
                }
            }
        }

        Ok(operations)
    }
}

/// Path of the exact-match lookup `key = value` in a type's auto index.
pub(crate) fn lookup_path(metadata: &EntityMetadata, key: &str, value: &str) -> String {
    format!(
        "{}/{}/{}",
        metadata.index_path(),
        encode_segment(key),
        encode_segment(value)
    )
}

/// Body that creates a full-text auto index.
pub(crate) fn index_definition(name: &str) -> Value {
    json!({
        "name": name,
        "config": {"type": "fulltext", "provider": "lucene"},
    })
}

pub(crate) fn encode_segment(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

fn add_entry(index_path: &str, key: &str, value: &str, target: &EntityRef) -> BatchOperation {
    BatchOperation::new(
        Method::Post,
        format!("{index_path}/{}/{}", encode_segment(key), encode_segment(value)),
    )
    .with_body(target.to_body())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Endpoint;
    use crate::schema::EntityDefinition;
    use neomap_core::MappingConfig;
    use pretty_assertions::assert_eq;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new(MappingConfig::default());
        registry
            .register(EntityDefinition::node("Person").property("name"))
            .register(EntityDefinition::relationship("Knows"));
        registry
    }

    fn targets(operations: &[BatchOperation]) -> Vec<(Method, &str)> {
        operations.iter().map(|op| (op.method, op.to.as_str())).collect()
    }

    #[test]
    fn create_indexes_scalars_and_discriminator() {
        let registry = registry();
        let mut person = registry.new_node("Person").unwrap();
        person
            .set("name", "Ada Lovelace")
            .set("tags", vec!["math"])
            .state_mut()
            .set_local_id(Some(LocalId(0)));

        let operations = AutoIndexer::new(&registry)
            .operations(&person, IndexTransition::Create)
            .unwrap();
        assert_eq!(
            targets(&operations),
            vec![
                (Method::Post, "/index/node/neomap_node_autoindex/name/Ada+Lovelace"),
                (Method::Post, "/index/node/neomap_node_autoindex/modelclass/Person"),
            ]
        );
        assert!(operations.iter().all(|op| op.body == Some(json!("{0}"))));
        assert!(operations.iter().all(|op| op.id.is_none()));
    }

    #[test]
    fn update_replaces_entries_by_identity() {
        let registry = registry();
        let mut person = registry.new_node("Person").unwrap();
        person.set("name", "Ada");
        person
            .state_mut()
            .commit_identity(Identity::parse("http://h/db/data/node/12").unwrap());

        let operations = AutoIndexer::new(&registry)
            .operations(&person, IndexTransition::Update)
            .unwrap();
        assert_eq!(
            targets(&operations),
            vec![
                (Method::Delete, "/index/node/neomap_node_autoindex/12"),
                (Method::Post, "/index/node/neomap_node_autoindex/name/Ada"),
                (Method::Post, "/index/node/neomap_node_autoindex/modelclass/Person"),
                (Method::Post, "/index/node/neomap_node_autoindex/id/12"),
            ]
        );
        assert_eq!(operations[1].body, Some(json!("http://h/db/data/node/12")));
    }

    #[test]
    fn relationships_index_their_type() {
        let registry = registry();
        let mut knows = registry.new_relationship("Knows", "KNOWS").unwrap();
        knows.set_end(Endpoint::Local(LocalId(0)));
        knows.state_mut().set_local_id(Some(LocalId(2)));

        let operations = AutoIndexer::new(&registry)
            .operations(&knows, IndexTransition::Create)
            .unwrap();
        assert_eq!(
            targets(&operations),
            vec![
                (
                    Method::Post,
                    "/index/relationship/neomap_relationship_autoindex/modelclass/Knows"
                ),
                (
                    Method::Post,
                    "/index/relationship/neomap_relationship_autoindex/type/KNOWS"
                ),
            ]
        );
    }

    #[test]
    fn delete_only_removes_entries() {
        let registry = registry();
        let mut person = registry.new_node("Person").unwrap();
        person.set("name", "Ada");
        let indexer = AutoIndexer::new(&registry);
        assert!(matches!(
            indexer.operations(&person, IndexTransition::Delete),
            Err(GraphError::IllegalState(_))
        ));

        person
            .state_mut()
            .commit_identity(Identity::parse("http://h/db/data/node/4").unwrap());
        let operations = indexer.operations(&person, IndexTransition::Delete).unwrap();
        assert_eq!(
            targets(&operations),
            vec![(Method::Delete, "/index/node/neomap_node_autoindex/4")]
        );
    }

    #[test]
    fn create_without_reference_is_illegal() {
        let registry = registry();
        let person = registry.new_node("Person").unwrap();
        assert!(AutoIndexer::new(&registry)
            .operations(&person, IndexTransition::Create)
            .is_err());
    }

    #[test]
    fn segments_are_form_encoded() {
        assert_eq!(encode_segment("a b/c&d"), "a+b%2Fc%26d");
        assert_eq!(
            index_definition("people"),
            json!({"name": "people", "config": {"type": "fulltext", "provider": "lucene"}})
        );
    }
}
