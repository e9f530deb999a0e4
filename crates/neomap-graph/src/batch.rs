//! Batch transaction builder.
//!
//! A transaction is an ordered list of REST operations submitted in one
//! request and applied atomically by the store. Containers created in the
//! batch get a local id equal to the position of their primary operation;
//! later operations refer to them with the `{N}` placeholder, which the store
//! replaces with the location of operation N's result.

use std::collections::{BTreeMap, HashMap, HashSet};

use neomap_core::{ContainerKind, InstanceKey, LocalId};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::client::GraphClient;
use crate::entity::{Endpoint, GraphEntity, Relationship};
use crate::error::{GraphError, Result};
use crate::index::{EntityRef, IndexTransition};
use crate::transport::Method;

/// One REST operation inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOperation {
    pub method: Method,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Correlation id; set only on operations that produce a container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl BatchOperation {
    pub fn new(method: Method, to: impl Into<String>) -> Self {
        Self {
            method,
            to: to.into(),
            body: None,
            id: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_id(mut self, local_id: LocalId) -> Self {
        self.id = Some(local_id.0);
        self
    }
}

/// Builder for one atomic batch. Consumed by [`BatchTransaction::execute`].
///
/// Queued containers stay mutably borrowed until the batch is executed or
/// dropped, so their state cannot drift from what was queued.
pub struct BatchTransaction<'a> {
    pub(crate) client: &'a GraphClient,
    pub(crate) id: Uuid,
    pub(crate) operations: Vec<BatchOperation>,
    pub(crate) instances: BTreeMap<LocalId, &'a mut dyn GraphEntity>,
    pub(crate) created: HashMap<InstanceKey, LocalId>,
    pub(crate) deleted: HashSet<LocalId>,
}

impl<'a> BatchTransaction<'a> {
    pub(crate) fn new(client: &'a GraphClient) -> Self {
        Self {
            client,
            id: Uuid::new_v4(),
            operations: Vec::new(),
            instances: BTreeMap::new(),
            created: HashMap::new(),
            deleted: HashSet::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Queue a create (for new containers) or an update (for persisted ones),
    /// followed by the matching auto-index operations. Returns the local id
    /// assigned to the container.
    ///
    /// Nothing is queued when validation or any precondition fails.
    pub fn add_save_operation<E>(&mut self, entity: &'a mut E, validate: bool) -> Result<LocalId>
    where
        E: GraphEntity,
    {
        let entity: &'a mut dyn GraphEntity = entity;

        if validate {
            if let Err(issues) = self.client.validator().validate(&*entity) {
                return Err(GraphError::ValidationFailed {
                    discriminator: entity.state().discriminator().to_string(),
                    issues,
                });
            }
        }
        self.ensure_not_queued(&*entity)?;

        let local_id = LocalId(self.operations.len() as u64);
        let planned = if entity.state().is_new() {
            self.plan_create(&*entity, local_id)?
        } else {
            self.plan_update(&*entity, local_id)?
        };

        let is_create = entity.state().is_new();
        entity.state_mut().set_local_id(Some(local_id));
        if is_create {
            self.created.insert(entity.state().key(), local_id);
        }
        tracing::debug!(
            transaction = %self.id,
            discriminator = %entity.state().discriminator(),
            local_id = local_id.0,
            create = is_create,
            operations = planned.len(),
            "Save queued"
        );
        self.operations.extend(planned);
        self.instances.insert(local_id, entity);
        Ok(local_id)
    }

    /// Queue removal of the container's index entries and then the container.
    pub fn add_delete_operation<E>(&mut self, entity: &'a mut E) -> Result<()>
    where
        E: GraphEntity,
    {
        let entity: &'a mut dyn GraphEntity = entity;
        self.ensure_not_queued(&*entity)?;

        let state = entity.state();
        let identity = match state.identity() {
            Some(identity) if !state.is_new() => identity.clone(),
            _ => {
                return Err(GraphError::IllegalState(format!(
                    "cannot delete an unsaved {}",
                    state.discriminator()
                )))
            }
        };

        let mut planned = self
            .client
            .auto_indexer()
            .operations_for(&*entity, IndexTransition::Delete, None)?;
        let local_id = LocalId((self.operations.len() + planned.len()) as u64);
        planned.push(
            BatchOperation::new(
                Method::Delete,
                format!("/{}/{}", entity.kind().resource(), identity.id()),
            )
            .with_id(local_id),
        );

        tracing::debug!(
            transaction = %self.id,
            discriminator = %entity.state().discriminator(),
            node = %identity,
            "Delete queued"
        );
        entity.state_mut().set_local_id(Some(local_id));
        self.operations.extend(planned);
        self.deleted.insert(local_id);
        self.instances.insert(local_id, entity);
        Ok(())
    }

    fn ensure_not_queued(&self, entity: &dyn GraphEntity) -> Result<()> {
        let key = entity.state().key();
        let queued = self
            .instances
            .values()
            .any(|instance| instance.state().key() == key);
        if queued {
            return Err(GraphError::IllegalState(format!(
                "{} is already queued in transaction {}",
                entity.state().discriminator(),
                self.id
            )));
        }
        Ok(())
    }

    fn plan_create(&self, entity: &dyn GraphEntity, local_id: LocalId) -> Result<Vec<BatchOperation>> {
        let state = entity.state();
        let field = &self.client.mapping().discriminator_field;
        let metadata = self.client.registry().metadata(state.discriminator())?;

        let primary = match entity.as_relationship() {
            None => BatchOperation::new(Method::Post, metadata.resource_path())
                .with_body(Value::Object(state.data(field))),
            Some(relationship) => {
                let rel_type = relationship.rel_type().ok_or_else(|| {
                    GraphError::IllegalState("relationship without a type".to_string())
                })?;
                let start = self.endpoint_ref(relationship, relationship.start(), "start")?;
                let end = self.endpoint_ref(relationship, relationship.end(), "end")?;
                let to = match start {
                    EntityRef::Local(start) => format!("{}/relationships", start.placeholder()),
                    EntityRef::Remote(start) => format!("/node/{}/relationships", start.id()),
                };
                BatchOperation::new(Method::Post, to).with_body(json!({
                    "to": end.to_body(),
                    "type": rel_type,
                    "data": state.data(field),
                }))
            }
        }
        .with_id(local_id);

        let index_ops = self.client.auto_indexer().operations_for(
            entity,
            IndexTransition::Create,
            Some(&EntityRef::Local(local_id)),
        )?;

        let mut planned = Vec::with_capacity(index_ops.len() + 1);
        planned.push(primary);
        planned.extend(index_ops);
        Ok(planned)
    }

    fn plan_update(&self, entity: &dyn GraphEntity, local_id: LocalId) -> Result<Vec<BatchOperation>> {
        let state = entity.state();
        let identity = state.identity().cloned().ok_or_else(|| {
            GraphError::IllegalState(format!(
                "persisted {} has no identity",
                state.discriminator()
            ))
        })?;
        let field = &self.client.mapping().discriminator_field;

        let primary = BatchOperation::new(
            Method::Put,
            format!("/{}/{}/properties", entity.kind().resource(), identity.id()),
        )
        .with_body(Value::Object(state.data(field)))
        .with_id(local_id);

        let index_ops = self.client.auto_indexer().operations_for(
            entity,
            IndexTransition::Update,
            Some(&EntityRef::Remote(identity)),
        )?;

        let mut planned = Vec::with_capacity(index_ops.len() + 1);
        planned.push(primary);
        planned.extend(index_ops);
        Ok(planned)
    }

    /// How a relationship endpoint is addressed: by the placeholder of a
    /// container created in this batch when there is one, else by identity.
    fn endpoint_ref(
        &self,
        relationship: &Relationship,
        endpoint: Option<&Endpoint>,
        which: &str,
    ) -> Result<EntityRef> {
        let missing = |reason: &str| {
            GraphError::IllegalState(format!(
                "{} {which} node {reason}",
                relationship.discriminator()
            ))
        };

        match endpoint.ok_or_else(|| missing("is not set"))? {
            Endpoint::Local(local_id) => {
                if self.created.values().any(|queued| queued == local_id) {
                    Ok(EntityRef::Local(*local_id))
                } else {
                    Err(missing("refers to a container not created in this batch"))
                }
            }
            Endpoint::Resolved(node) => match self.created.get(&node.key()) {
                Some(local_id) => Ok(EntityRef::Local(*local_id)),
                None => node
                    .identity()
                    .cloned()
                    .map(EntityRef::Remote)
                    .ok_or_else(|| missing("is neither persisted nor queued")),
            },
            Endpoint::Remote(identity) => Ok(EntityRef::Remote(identity.clone())),
        }
    }

    /// Distinct auto indexes touched by the queued containers.
    pub(crate) fn touched_indexes(&self) -> Result<Vec<(ContainerKind, String)>> {
        let mut indexes: Vec<(ContainerKind, String)> = Vec::new();
        for instance in self.instances.values() {
            let metadata = self
                .client
                .registry()
                .metadata(instance.state().discriminator())?;
            let index = (metadata.kind(), metadata.index_name().to_string());
            if !indexes.contains(&index) {
                indexes.push(index);
            }
        }
        Ok(indexes)
    }
}

/// Local ids only mean something inside their batch; release them when the
/// transaction goes away, executed or not.
impl Drop for BatchTransaction<'_> {
    fn drop(&mut self) {
        for instance in self.instances.values_mut() {
            instance.state_mut().set_local_id(None);
        }
    }
}

impl std::fmt::Debug for BatchTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchTransaction")
            .field("id", &self.id)
            .field("operations", &self.operations)
            .field("queued", &self.instances.len())
            .finish()
    }
}
