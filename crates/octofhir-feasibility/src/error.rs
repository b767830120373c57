//! Error types for structured query translation and evaluation.

use octofhir_core::{ContextualTermCode, ExecutorError, PopulationError, TermCode};
use thiserror::Error;

/// Result type for feasibility operations
pub type Result<T> = std::result::Result<T, FeasibilityError>;

/// Errors raised while expanding, translating or evaluating a structured query.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeasibilityError {
    /// None of the concept's codings has a mapping
    #[error("Concept {0} is not expandable: none of its term codes is mapped")]
    ConceptNotExpandable(String),

    /// The expansion tree yields no code for the concept
    #[error("Concept {0} is not expandable within its context")]
    ContextualConceptNotExpandable(String),

    #[error("No mapping found for {0}")]
    MappingNotFound(ContextualTermCode),

    #[error("No attribute mapping for {attribute} in the mapping of {key}")]
    AttributeMappingNotFound { key: TermCode, attribute: TermCode },

    #[error("Mapping of {0} has no value search parameter")]
    MissingValueSearchParameter(TermCode),

    /// Age or date arithmetic failed
    #[error("Calculation error: {0}")]
    Calculation(String),

    #[error("Population serialization error: {0}")]
    Serializer(#[from] PopulationError),

    #[error("Attribute {attribute} of type {attribute_type} does not accept a {filter} filter")]
    AttributeTypeMismatch {
        attribute: TermCode,
        attribute_type: String,
        filter: String,
    },

    #[error("Mapping of {0} has no time restriction parameter")]
    MissingTimeRestrictionParameter(TermCode),

    #[error("Invalid structured query: {0}")]
    InvalidStructuredQuery(String),

    #[error("Failed to load mappings from {path}: {message}")]
    MappingLoad { path: String, message: String },

    /// Backend query failed
    #[error(transparent)]
    Query(#[from] ExecutorError),
}

impl FeasibilityError {
    pub fn calculation(message: impl Into<String>) -> Self {
        Self::Calculation(message.into())
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidStructuredQuery(message.into())
    }

    /// Whether the error is caused by the submitted query (maps to a 4xx response)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ConceptNotExpandable(_)
                | Self::ContextualConceptNotExpandable(_)
                | Self::MappingNotFound(_)
                | Self::AttributeMappingNotFound { .. }
                | Self::MissingValueSearchParameter(_)
                | Self::Calculation(_)
                | Self::AttributeTypeMismatch { .. }
                | Self::MissingTimeRestrictionParameter(_)
                | Self::InvalidStructuredQuery(_)
        )
    }

    /// Whether the error is an internal or backend failure (maps to a 5xx response)
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}
