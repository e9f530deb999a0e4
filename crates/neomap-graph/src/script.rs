//! Server-side query scripts.

use serde_json::{json, Map, Value};

/// Which server-side engine runs a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLanguage {
    Gremlin,
    Cypher,
}

/// Anything that can be sent to a script endpoint.
pub trait QuerySource {
    fn language(&self) -> ScriptLanguage;

    fn to_script_string(&self) -> String;

    /// Named parameters, where the engine supports them.
    fn params(&self) -> Option<Value> {
        None
    }

    /// The request body for the language's endpoint.
    fn request_body(&self) -> Value {
        match self.language() {
            ScriptLanguage::Gremlin => json!({ "script": self.to_script_string() }),
            ScriptLanguage::Cypher => json!({
                "query": self.to_script_string(),
                "params": self.params().unwrap_or_else(|| Value::Object(Map::new())),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GremlinScript(String);

impl GremlinScript {
    pub fn new(script: impl Into<String>) -> Self {
        Self(script.into())
    }

    /// A script walking `fragment` from the vertex with the given id.
    pub fn anchored(node_id: &str, fragment: &str) -> Self {
        Self(format!("g.v({node_id}).{}", fragment.trim_start_matches('.')))
    }
}

impl QuerySource for GremlinScript {
    fn language(&self) -> ScriptLanguage {
        ScriptLanguage::Gremlin
    }

    fn to_script_string(&self) -> String {
        self.0.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CypherQuery {
    query: String,
    params: Map<String, Value>,
}

impl CypherQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Map::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

impl QuerySource for CypherQuery {
    fn language(&self) -> ScriptLanguage {
        ScriptLanguage::Cypher
    }

    fn to_script_string(&self) -> String {
        self.query.clone()
    }

    fn params(&self) -> Option<Value> {
        Some(Value::Object(self.params.clone()))
    }
}
