//! Server-side traversal descriptions.

use neomap_core::Identity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    All,
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::All => "all",
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraversalOrder {
    #[serde(rename = "breadth first")]
    BreadthFirst,
    #[serde(rename = "depth first")]
    DepthFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Uniqueness {
    #[serde(rename = "node global")]
    NodeGlobal,
    #[serde(rename = "node path")]
    NodePath,
    #[serde(rename = "node recent")]
    NodeRecent,
    #[serde(rename = "relationship global")]
    RelationshipGlobal,
    #[serde(rename = "relationship path")]
    RelationshipPath,
    #[serde(rename = "relationship recent")]
    RelationshipRecent,
    #[serde(rename = "none")]
    None,
}

/// What a traversal hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalReturn {
    #[default]
    Nodes,
    Relationships,
    Paths,
}

impl TraversalReturn {
    /// Path segment of the traverse endpoint, e.g. `traverse/node`.
    pub fn segment(&self) -> &'static str {
        match self {
            TraversalReturn::Nodes => "node",
            TraversalReturn::Relationships => "relationship",
            TraversalReturn::Paths => "path",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipFilter {
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

/// A prune evaluator or return filter: a builtin name or a script body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluator {
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl Evaluator {
    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            language: "builtin".to_string(),
            name: Some(name.into()),
            body: None,
        }
    }

    pub fn javascript(body: impl Into<String>) -> Self {
        Self {
            language: "javascript".to_string(),
            name: None,
            body: Some(body.into()),
        }
    }
}

/// Body of a `traverse/{returnType}` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraversalDescription {
    #[serde(skip_serializing_if = "Option::is_none")]
    order: Option<TraversalOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uniqueness: Option<Uniqueness>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    relationships: Vec<RelationshipFilter>,
    #[serde(rename = "max depth", skip_serializing_if = "Option::is_none")]
    max_depth: Option<u32>,
    #[serde(rename = "prune evaluator", skip_serializing_if = "Option::is_none")]
    prune_evaluator: Option<Evaluator>,
    #[serde(rename = "return filter", skip_serializing_if = "Option::is_none")]
    return_filter: Option<Evaluator>,
    #[serde(skip)]
    returns: TraversalReturn,
}

impl TraversalDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(mut self, order: TraversalOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn uniqueness(mut self, uniqueness: Uniqueness) -> Self {
        self.uniqueness = Some(uniqueness);
        self
    }

    pub fn relationship(mut self, rel_type: impl Into<String>, direction: Option<Direction>) -> Self {
        self.relationships.push(RelationshipFilter {
            rel_type: rel_type.into(),
            direction,
        });
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn prune_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.prune_evaluator = Some(evaluator);
        self
    }

    pub fn return_filter(mut self, filter: Evaluator) -> Self {
        self.return_filter = Some(filter);
        self
    }

    /// Return only nodes whose property `key` equals `value`.
    pub fn node_property_filter(self, key: &str, value: &str) -> Self {
        let body = format!(
            "position.endNode().hasProperty('{key}') && position.endNode().getProperty('{key}') == '{}'",
            value.replace('\'', "\\'")
        );
        self.return_filter(Evaluator::javascript(body))
    }

    pub fn returns(mut self, returns: TraversalReturn) -> Self {
        self.returns = returns;
        self
    }

    pub fn return_type(&self) -> TraversalReturn {
        self.returns
    }
}

/// A path as reported by a path traversal: references only, no properties.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathReference {
    pub start: Identity,
    pub end: Identity,
    #[serde(default)]
    pub nodes: Vec<Identity>,
    #[serde(default)]
    pub relationships: Vec<Identity>,
    #[serde(default)]
    pub length: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn description_uses_store_field_names() {
        let description = TraversalDescription::new()
            .order(TraversalOrder::DepthFirst)
            .uniqueness(Uniqueness::NodeGlobal)
            .relationship("KNOWS", Some(Direction::Out))
            .relationship("LIKES", None)
            .max_depth(3)
            .prune_evaluator(Evaluator::builtin("none"))
            .returns(TraversalReturn::Paths);

        assert_eq!(
            serde_json::to_value(&description).unwrap(),
            json!({
                "order": "depth first",
                "uniqueness": "node global",
                "relationships": [
                    {"type": "KNOWS", "direction": "out"},
                    {"type": "LIKES"},
                ],
                "max depth": 3,
                "prune evaluator": {"language": "builtin", "name": "none"},
            })
        );
        assert_eq!(description.return_type().segment(), "path");
    }

    #[test]
    fn empty_description_serializes_empty() {
        assert_eq!(
            serde_json::to_value(TraversalDescription::new()).unwrap(),
            json!({})
        );
        assert_eq!(TraversalDescription::new().return_type(), TraversalReturn::Nodes);
    }

    #[test]
    fn property_filter_escapes_quotes() {
        let description = TraversalDescription::new().node_property_filter("name", "O'Brien");
        let value = serde_json::to_value(&description).unwrap();
        assert_eq!(value["return filter"]["language"], json!("javascript"));
        assert!(value["return filter"]["body"]
            .as_str()
            .unwrap()
            .contains("== 'O\\'Brien'"));
    }

    #[test]
    fn path_reference_parses() {
        let path: PathReference = serde_json::from_value(json!({
            "start": "http://h/db/data/node/1",
            "nodes": ["http://h/db/data/node/1", "http://h/db/data/node/2"],
            "relationships": ["http://h/db/data/relationship/5"],
            "end": "http://h/db/data/node/2",
            "length": 1,
        }))
        .unwrap();
        assert_eq!(path.end.id(), "2");
        assert_eq!(path.nodes.len(), 2);
    }
}
