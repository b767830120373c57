//! Feasibility query evaluation.
//!
//! A [`StructuredQuery`] describes a cohort as inclusion and exclusion criteria.
//! Each [`Criterion`] is expanded through a [`MappingContext`] into FHIR searches
//! ([`ExpandedCriterion`]), the searches are dispatched through a query service
//! and the resulting patient populations are combined with set algebra into the
//! number of matching patients.
//!
//! ```text
//! StructuredQuery ─► Criterion ─► ExpandedCriterion ─► Query ─► Population
//!                       │                                          │
//!                 MappingContext                         union / intersect / difference
//! ```

pub mod config;
pub mod criterion;
pub mod error;
pub mod expanded;
pub mod group;
pub mod mapping;
pub mod quantity;
pub mod service;

pub use config::EvaluationConfig;
pub use criterion::{AttributeFilter, AttributeFilterKind, Criterion, TimeRestriction, ValueFilter};
pub use error::{FeasibilityError, Result};
pub use expanded::{ExpandedCriterion, ExpandedFilter};
pub use group::{Cnf, CriterionGroup, StructuredQuery};
pub use mapping::{Clock, Mapping, MappingContext, MappingTree};
pub use quantity::{Comparator, Unit};
pub use service::{StructuredQueryService, TranslatedCriterion, TranslatedQuery, translate};
