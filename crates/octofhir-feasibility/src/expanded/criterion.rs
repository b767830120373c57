use octofhir_core::Query;

use super::filter::ExpandedFilter;

/// A mapping-resolved criterion: one search over one resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedCriterion {
    pub resource_type: String,
    pub filter: ExpandedFilter,
}

impl ExpandedCriterion {
    pub fn new(resource_type: impl Into<String>, filter: ExpandedFilter) -> Self {
        Self {
            resource_type: resource_type.into(),
            filter,
        }
    }

    pub fn append_filter(self, filter: ExpandedFilter) -> Self {
        Self {
            resource_type: self.resource_type,
            filter: self.filter.append(filter),
        }
    }

    pub fn to_query(&self) -> Query {
        Query::new(self.resource_type.clone(), self.filter.to_params())
    }
}
