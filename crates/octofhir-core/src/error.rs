use thiserror::Error;

/// Core error types for feasibility value objects
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("A concept requires at least one term code")]
    EmptyConcept,

    #[error("A criterion group requires at least one element")]
    EmptyGroup,

    #[error("Invalid FHIR date: {0}")]
    InvalidDate(String),
}

impl CoreError {
    /// Create a new InvalidDate error
    pub fn invalid_date(value: impl Into<String>) -> Self {
        Self::InvalidDate(value.into())
    }
}

/// Errors raised while constructing, encoding or decoding a [`Population`].
///
/// [`Population`]: crate::population::Population
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PopulationError {
    #[error("Invalid patient id {id:?}: {reason}")]
    InvalidPatientId { id: String, reason: &'static str },

    #[error("Cannot decode a population from an empty buffer")]
    EmptyBuffer,

    #[error("Unsupported population format version {0}")]
    UnsupportedVersion(u8),

    #[error("Population buffer truncated at byte {0}")]
    Truncated(usize),
}

/// Errors raised by a FHIR search backend or a query service in front of it.
///
/// Cloneable so that a single failed load can be handed to every caller that
/// was waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("FHIR search backend error: {0}")]
    Backend(String),

    #[error("FHIR search timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid search response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Population(#[from] PopulationError),
}

impl ExecutorError {
    /// Create a new Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Create a new InvalidResponse error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
