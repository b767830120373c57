//! Core types for OctoFHIR feasibility queries.
//!
//! - Coded clinical identifiers ([`TermCode`], [`Concept`] and their contextual forms)
//! - Patient populations with set algebra and a compact binary encoding
//! - Rendered FHIR search requests ([`Query`]) used as cache keys
//! - The executor / query service seams implemented by backends and cache tiers

pub mod date;
pub mod error;
pub mod executor;
pub mod population;
pub mod query;
pub mod term_code;

pub use date::{format_fhir_date, parse_fhir_date, today_utc};
pub use error::{CoreError, ExecutorError, PopulationError, Result};
pub use executor::{DynQueryService, ExecutorQueryService, FhirQueryService, FhirSearchExecutor};
pub use population::{MAX_PATIENT_ID_LEN, Population};
pub use query::{Query, QueryParams};
pub use term_code::{Concept, ContextualConcept, ContextualTermCode, TermCode};
