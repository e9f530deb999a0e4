//! Neomap Graph: object mapping over the Neo4j REST API.
//!
//! Typed entities are stored as schemaless nodes and relationships tagged
//! with a discriminator. This crate recovers the concrete type on load,
//! resolves declared relations lazily, keeps a per-type auto index in step
//! with every write, and groups writes into atomic batch transactions.

pub mod batch;
pub mod client;
pub mod commit;
pub mod entity;
pub mod error;
pub mod index;
pub mod materialize;
pub mod metadata;
pub mod mutations;
pub mod queries;
pub mod resolver;
pub mod schema;
pub mod script;
pub mod transport;
pub mod traversal;
pub mod validation;

pub use batch::{BatchOperation, BatchTransaction};
pub use client::GraphClient;
pub use commit::BatchReceipt;
pub use entity::{Endpoint, Entity, GraphEntity, Node, Path, PropertyContainer, Relationship};
pub use error::{GraphError, Result};
pub use index::{AutoIndexer, EntityRef, IndexTransition};
pub use materialize::Materializer;
pub use metadata::EntityMetadata;
pub use queries::Traversal;
pub use resolver::{RelationItem, RelationResult};
pub use schema::{
    Cardinality, EntityDefinition, Model, RelationDef, RelationTarget, SchemaRegistry,
    GENERIC_NODE, GENERIC_RELATIONSHIP,
};
pub use script::{CypherQuery, GremlinScript, QuerySource, ScriptLanguage};
pub use transport::{HttpTransport, Method, ScriptedTransport, Transport, TransportError};
pub use traversal::{Direction, TraversalDescription, TraversalReturn};
pub use validation::{AcceptAll, RequiredProperties, ValidationIssue, Validator};
