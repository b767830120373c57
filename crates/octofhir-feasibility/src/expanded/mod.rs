//! Mapping-resolved criteria and their rendering to search requests.

mod criterion;
mod filter;

pub use criterion::ExpandedCriterion;
pub use filter::ExpandedFilter;
