//! Shared client for the REST graph store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use neomap_core::{GraphConfig, Identity, MappingConfig, NeomapConfig};
use serde_json::Value;

use crate::batch::BatchTransaction;
use crate::error::{GraphError, Result};
use crate::index::AutoIndexer;
use crate::materialize::Materializer;
use crate::schema::SchemaRegistry;
use crate::transport::{HttpTransport, Method, Transport, TransportError};
use crate::validation::{AcceptAll, Validator};

/// Entry point for all store access: finders, relation resolution, and
/// batch transactions.
///
/// Clone is cheap (inner Arcs); clones share the registry, the transport, and
/// the set of auto indexes already ensured.
#[derive(Clone)]
pub struct GraphClient {
    transport: Arc<dyn Transport>,
    registry: Arc<SchemaRegistry>,
    validator: Arc<dyn Validator>,
    config: GraphConfig,
    ensured_indexes: Arc<Mutex<HashSet<String>>>,
}

impl GraphClient {
    /// Build a client over HTTP. No request is made until first use.
    pub fn connect(config: &NeomapConfig, registry: SchemaRegistry) -> Self {
        let transport = HttpTransport::new(&config.graph);
        tracing::info!(base_url = %transport.base_url(), "Neo4j REST client ready");
        Self::with_transport(Arc::new(transport), registry, config.graph.clone())
    }

    /// Build a client over any transport.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        registry: SchemaRegistry,
        config: GraphConfig,
    ) -> Self {
        Self {
            transport,
            registry: Arc::new(registry),
            validator: Arc::new(AcceptAll),
            config,
            ensured_indexes: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Replace the validator run by validating save operations.
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn mapping(&self) -> &MappingConfig {
        self.registry.mapping()
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn validator(&self) -> &dyn Validator {
        self.validator.as_ref()
    }

    pub fn materializer(&self) -> Materializer<'_> {
        Materializer::new(&self.registry)
    }

    pub fn auto_indexer(&self) -> AutoIndexer<'_> {
        AutoIndexer::new(&self.registry)
    }

    /// Start an empty batch transaction.
    pub fn transaction(&self) -> BatchTransaction<'_> {
        BatchTransaction::new(self)
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Send one request and return the decoded body. A missing resource
    /// surfaces as [`GraphError::NotFound`].
    pub fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        match self.transport.request(method, path, body) {
            Ok(response) => Ok(response.data),
            Err(TransportError::NotFound { path }) => Err(GraphError::NotFound { what: path }),
            Err(err) => Err(err.into()),
        }
    }

    /// The service root document; doubles as a connectivity check.
    pub fn ping(&self) -> Result<Value> {
        self.request(Method::Get, "/", None)
    }

    /// The raw representation behind an identity.
    pub fn fetch(&self, identity: &Identity) -> Result<Value> {
        self.request(Method::Get, identity.uri(), None)
    }

    /// Returns true the first time an index path is seen by this client.
    pub(crate) fn mark_index_ensured(&self, index_path: &str) -> bool {
        self.ensured_indexes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(index_path.to_string())
    }

    pub(crate) fn forget_index(&self, index_path: &str) {
        self.ensured_indexes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(index_path);
    }
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.config.base_url())
            .field("registry", &self.registry)
            .finish()
    }
}
