//! neomap-core: shared value types, configuration, and error handling.
//!
//! This crate provides the foundational pieces used by the mapping engine:
//! - Property values (scalars and arrays of scalars) as stored on nodes and relationships
//! - Identity URIs, transaction-local ids, and client-side instance keys
//! - Configuration loading for the store connection and the mapping conventions
//! - The shared error type

pub mod config;
pub mod error;
pub mod types;

pub use config::{GraphConfig, MappingConfig, NeomapConfig};
pub use error::CoreError;
pub use types::{ContainerKind, Identity, InstanceKey, LocalId, PropertyValue, Scalar};
