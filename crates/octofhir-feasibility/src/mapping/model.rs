//! Mapping of contextual term codes to FHIR search requests.

use octofhir_core::{ContextualTermCode, TermCode};
use serde::{Deserialize, Serialize};

use crate::expanded::ExpandedFilter;

/// How the value of a criterion is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Raw code token (`code=final`)
    Code,
    /// Coding token (`code=system|code`)
    Concept,
    Quantity,
    /// Quantity in age units, searched as a birth date
    Age,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixedCriterionType {
    Code,
    Coding,
}

/// A search parameter every query for the mapping carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedCriterion {
    #[serde(rename = "type")]
    pub criterion_type: FixedCriterionType,
    pub search_parameter: String,
    pub value: Vec<TermCode>,
}

impl FixedCriterion {
    /// One filter whose alternatives are comma-joined.
    pub fn to_filter(&self) -> ExpandedFilter {
        match self.criterion_type {
            FixedCriterionType::Code => ExpandedFilter::Code {
                search_parameter: self.search_parameter.clone(),
                codes: self.value.iter().map(|tc| tc.code.clone()).collect(),
            },
            FixedCriterionType::Coding => ExpandedFilter::Concept {
                search_parameter: self.search_parameter.clone(),
                term_codes: self.value.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Code,
    Coding,
    Composite,
    Reference,
}

impl AttributeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Coding => "coding",
            Self::Composite => "composite",
            Self::Reference => "reference",
        }
    }
}

/// Search parameter of one attribute of a mapped resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeMapping {
    pub attribute_key: TermCode,
    pub attribute_type: AttributeType,
    pub attribute_search_parameter: String,
    /// Component code of a composite search parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_code: Option<TermCode>,
}

/// How one contextual term code maps to a FHIR search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    pub key: TermCode,
    pub context: TermCode,
    pub resource_type: String,

    /// Absent for resources selected by other parameters only (e.g. Patient)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_code_search_parameter: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_search_parameter: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixed_criteria: Vec<FixedCriterion>,

    #[serde(
        default,
        rename = "attributeSearchParameters",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub attribute_mappings: Vec<AttributeMapping>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_restriction_parameter: Option<String>,

    /// Coding searched instead of the key's coding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_code: Option<TermCode>,
}

impl Mapping {
    pub fn new(key: TermCode, context: TermCode, resource_type: impl Into<String>) -> Self {
        Self {
            key,
            context,
            resource_type: resource_type.into(),
            term_code_search_parameter: None,
            value_search_parameter: None,
            value_type: None,
            fixed_criteria: Vec::new(),
            attribute_mappings: Vec::new(),
            time_restriction_parameter: None,
            primary_code: None,
        }
    }

    pub fn contextual_key(&self) -> ContextualTermCode {
        ContextualTermCode::new(self.context.clone(), self.key.clone())
    }

    pub fn attribute_mapping(&self, attribute: &TermCode) -> Option<&AttributeMapping> {
        self.attribute_mappings
            .iter()
            .find(|m| &m.attribute_key == attribute)
    }

    /// Filter selecting resources coded with `term_code`, plus the fixed criteria.
    pub fn base_filter(&self, term_code: &TermCode) -> ExpandedFilter {
        let term_code_filter = match &self.term_code_search_parameter {
            Some(search_parameter) => ExpandedFilter::Concept {
                search_parameter: search_parameter.clone(),
                term_codes: vec![self.primary_code.clone().unwrap_or_else(|| term_code.clone())],
            },
            None => ExpandedFilter::Empty,
        };
        self.fixed_criteria
            .iter()
            .fold(term_code_filter, |filter, fixed| filter.append(fixed.to_filter()))
    }
}
