//! Value types shared by every part of the mapping engine.
//!
//! Properties on the store are schemaless: a value is a scalar or a flat
//! array of scalars. Everything else (null, nested objects) cannot be stored.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;

// ── Property values ──────────────────────────────────────────────

/// A single storable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Render the value the way it is written into an index entry.
    pub fn index_value(&self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::String(s) => s.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Scalar::Int)
                .or_else(|| n.as_f64().map(Scalar::Float)),
            Value::String(s) => Some(Scalar::String(s.clone())),
            _ => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(value.into())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

/// A property value: one scalar or an array of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Scalar(Scalar),
    Array(Vec<Scalar>),
}

impl PropertyValue {
    /// Convert a JSON value, rejecting null, objects, and nested arrays.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(Scalar::from_json)
                .collect::<Option<Vec<_>>>()
                .map(PropertyValue::Array),
            other => Scalar::from_json(other).map(PropertyValue::Scalar),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Scalar(s) => scalar_to_json(s),
            PropertyValue::Array(items) => Value::Array(items.iter().map(scalar_to_json).collect()),
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            PropertyValue::Scalar(s) => Some(s),
            PropertyValue::Array(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, PropertyValue::Array(_))
    }
}

fn scalar_to_json(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Int(i) => Value::from(*i),
        Scalar::Float(f) => Value::from(*f),
        Scalar::String(s) => Value::String(s.clone()),
    }
}

macro_rules! scalar_property_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for PropertyValue {
                fn from(value: $ty) -> Self {
                    PropertyValue::Scalar(value.into())
                }
            }
        )*
    };
}

scalar_property_from!(Scalar, &str, String, bool, i64, i32, f64);

impl<T: Into<Scalar>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        PropertyValue::Array(values.into_iter().map(Into::into).collect())
    }
}

// ── Identities ───────────────────────────────────────────────────

/// The persistent reference the store assigns to a node or relationship:
/// its full resource URI, e.g. `http://localhost:7474/db/data/node/12`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn parse(uri: impl Into<String>) -> Result<Self, CoreError> {
        let uri = uri.into();
        let trimmed = uri.trim_end_matches('/');
        match trimmed.rsplit_once('/') {
            Some((_, id)) if !id.is_empty() => Ok(Self(trimmed.to_string())),
            _ => Err(CoreError::InvalidIdentity(uri)),
        }
    }

    /// The trailing id segment of the URI.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn uri(&self) -> &str {
        &self.0
    }

    /// Which kind of container the URI points at, judged by its resource segment.
    pub fn kind_hint(&self) -> Option<ContainerKind> {
        if self.0.contains("/node/") {
            Some(ContainerKind::Node)
        } else if self.0.contains("/relationship/") {
            Some(ContainerKind::Relationship)
        } else {
            None
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transaction-scoped id of a container queued in a batch. Equal to the
/// position of the container's primary operation in the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(pub u64);

impl LocalId {
    /// The `{N}` form the store substitutes with operation N's result location.
    pub fn placeholder(&self) -> String {
        format!("{{{}}}", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0)
    }
}

/// Client-side key of one logical container instance. Clones share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceKey(pub Uuid);

impl InstanceKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceKey {
    fn default() -> Self {
        Self::new()
    }
}

// ── Container kinds ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Node,
    Relationship,
}

impl ContainerKind {
    /// Base resource segment, e.g. `node`.
    pub fn resource(&self) -> &'static str {
        match self {
            ContainerKind::Node => "node",
            ContainerKind::Relationship => "relationship",
        }
    }

    /// Secondary-index resource segment, e.g. `index/node`.
    pub fn index_resource(&self) -> &'static str {
        match self {
            ContainerKind::Node => "index/node",
            ContainerKind::Relationship => "index/relationship",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}
