//! Rendered FHIR search requests.
//!
//! A [`Query`] is the fully rendered form of one search: a resource type plus an
//! ordered multi-map of search parameters. Its string form
//! (`Observation?code=http://loinc.org|718-7&value-quantity=ge5`) is deterministic
//! and doubles as the cache key for every cache tier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered multi-map of search parameter names to values.
///
/// Parameter order is preserved exactly as appended and the same name may occur
/// several times (e.g. a date range renders as `date=ge..&date=le..`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryParams {
    params: Vec<(String, String)>,
}

impl QueryParams {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::empty().append_param(name, value)
    }

    pub fn append_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn append_params(mut self, other: QueryParams) -> Self {
        self.params.extend(other.params);
        self
    }

    /// Prefix every parameter name with `{prefix}.`, as used by chained search.
    pub fn prefix_names(self, prefix: &str) -> Self {
        Self {
            params: self
                .params
                .into_iter()
                .map(|(name, value)| (format!("{prefix}.{name}"), value))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for QueryParams {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

/// A rendered FHIR search request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    resource_type: String,
    params: QueryParams,
}

impl Query {
    pub fn new(resource_type: impl Into<String>, params: QueryParams) -> Self {
        Self {
            resource_type: resource_type.into(),
            params,
        }
    }

    /// A query for all resources of a type, without search parameters.
    pub fn of_type(resource_type: impl Into<String>) -> Self {
        Self::new(resource_type, QueryParams::empty())
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// The deterministic cache key of this query.
    pub fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            f.write_str(&self.resource_type)
        } else {
            write!(f, "{}?{}", self.resource_type, self.params)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_query() {
        let query = Query::new(
            "Observation",
            QueryParams::of("code", "http://loinc.org|718-7")
                .append_param("value-quantity", "ge5|http://unitsofmeasure.org|g/dL"),
        );

        assert_eq!(
            query.to_string(),
            "Observation?code=http://loinc.org|718-7&value-quantity=ge5|http://unitsofmeasure.org|g/dL"
        );
        assert_eq!(query.cache_key(), query.to_string());
    }

    #[test]
    fn test_render_query_without_params() {
        assert_eq!(Query::of_type("Patient").to_string(), "Patient");
    }

    #[test]
    fn test_params_keep_duplicates_and_order() {
        let params = QueryParams::of("date", "ge2020-01-01")
            .append_params(QueryParams::of("date", "le2020-12-31"))
            .append_param("status", "final");

        assert_eq!(
            params.to_string(),
            "date=ge2020-01-01&date=le2020-12-31&status=final"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_prefix_names() {
        let params = QueryParams::of("code", "http://snomed.info/sct|119297000")
            .append_param("status", "available")
            .prefix_names("specimen:Specimen");

        assert_eq!(
            params.to_string(),
            "specimen:Specimen.code=http://snomed.info/sct|119297000&specimen:Specimen.status=available"
        );
    }
}
