//! Error taxonomy of the mapping engine.

use neomap_core::CoreError;

use crate::transport::TransportError;
use crate::validation::ValidationIssue;

/// Errors from mapping, resolution, and batch operations.
///
/// Builder-time failures (`ValidationFailed`, `Configuration`, `IllegalState`)
/// are raised before anything reaches the transport. Failures during batch
/// submission or result correlation surface as `TransactionFailed`.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Validation failed for {discriminator}: {issues:?}")]
    ValidationFailed {
        discriminator: String,
        issues: Vec<ValidationIssue>,
    },

    #[error("Transaction failed: {message}")]
    TransactionFailed {
        message: String,
        #[source]
        source: Option<TransportError>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl GraphError {
    /// Whether this is the recoverable "nothing there" case.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GraphError::NotFound { .. } | GraphError::Transport(TransportError::NotFound { .. })
        )
    }

    pub(crate) fn transaction(message: impl Into<String>) -> Self {
        GraphError::TransactionFailed {
            message: message.into(),
            source: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
