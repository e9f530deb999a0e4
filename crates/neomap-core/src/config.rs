//! Configuration for the store connection and the mapping conventions.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`NEOMAP__` prefix, `__` separator, e.g. `NEOMAP__GRAPH__HOST`)
//! 2. Config file (`neomap.toml` by default)
//! 3. Defaults

use serde::Deserialize;

use crate::error::CoreError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NeomapConfig {
    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub mapping: MappingConfig,
}

impl NeomapConfig {
    /// Load configuration from `<file_prefix>.toml` (optional) and `NEOMAP__*` variables.
    pub fn load(file_prefix: &str) -> Result<Self, CoreError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("NEOMAP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: NeomapConfig = cfg.try_deserialize()?;
        tracing::debug!(
            base_url = %loaded.graph.base_url(),
            discriminator_field = %loaded.mapping.discriminator_field,
            "Configuration loaded"
        );
        Ok(loaded)
    }
}

/// Connection settings for the HTTP graph store.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the REST root below the host, e.g. `db/data`.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Connect/read/write timeout for a single request.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// HTTP basic auth; both must be set to take effect.
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Endpoint (relative to the REST root) that executes Gremlin scripts.
    #[serde(default = "default_gremlin_path")]
    pub gremlin_path: String,

    /// Endpoint (relative to the REST root) that executes Cypher queries.
    #[serde(default = "default_cypher_path")]
    pub cypher_path: String,
}

impl GraphConfig {
    /// The REST root every relative store path is resolved against.
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}/{}",
            self.scheme,
            self.host,
            self.port,
            self.db_path.trim_matches('/')
        )
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            timeout_ms: default_timeout_ms(),
            user: None,
            password: None,
            gremlin_path: default_gremlin_path(),
            cypher_path: default_cypher_path(),
        }
    }
}

/// Conventions used when mapping entities onto the schemaless store.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingConfig {
    /// Property that stores the concrete type of an entity. Changing it after
    /// data has been written makes existing entities materialize as the fallback type.
    #[serde(default = "default_discriminator_field")]
    pub discriminator_field: String,

    #[serde(default = "default_node_index")]
    pub node_index: String,

    #[serde(default = "default_relationship_index")]
    pub relationship_index: String,

    /// Index key under which a node's own id is recorded.
    #[serde(default = "default_identity_index_key")]
    pub identity_index_key: String,

    /// Create the auto indexes on first use.
    #[serde(default = "default_true")]
    pub auto_create_indexes: bool,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            discriminator_field: default_discriminator_field(),
            node_index: default_node_index(),
            relationship_index: default_relationship_index(),
            identity_index_key: default_identity_index_key(),
            auto_create_indexes: default_true(),
        }
    }
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    7474
}

fn default_db_path() -> String {
    "db/data".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_gremlin_path() -> String {
    "ext/GremlinPlugin/graphdb/execute_script".to_string()
}

fn default_cypher_path() -> String {
    "ext/CypherPlugin/graphdb/execute_query".to_string()
}

fn default_discriminator_field() -> String {
    "modelclass".to_string()
}

fn default_node_index() -> String {
    "neomap_node_autoindex".to_string()
}

fn default_relationship_index() -> String {
    "neomap_relationship_autoindex".to_string()
}

fn default_identity_index_key() -> String {
    "id".to_string()
}

fn default_true() -> bool {
    true
}
