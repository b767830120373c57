//! Filters on attributes of the mapped resource.

use octofhir_core::TermCode;
use serde::{Deserialize, Serialize};

use super::Criterion;
use crate::error::{FeasibilityError, Result};
use crate::expanded::ExpandedFilter;
use crate::mapping::{AttributeMapping, AttributeType, Mapping, MappingContext};
use crate::quantity::{Comparator, Unit};

/// A filter on one attribute, identified by its attribute code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeFilter {
    pub attribute_code: TermCode,
    #[serde(flatten)]
    pub kind: AttributeFilterKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AttributeFilterKind {
    /// Any of the selected concepts
    #[serde(rename_all = "camelCase")]
    Concept { selected_concepts: Vec<TermCode> },

    QuantityComparator {
        comparator: Comparator,
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<Unit>,
    },

    QuantityRange {
        #[serde(rename = "minValue")]
        lower: f64,
        #[serde(rename = "maxValue")]
        upper: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<Unit>,
    },

    /// The referenced resource matches any of the criteria
    Reference { criteria: Vec<Criterion> },
}

impl AttributeFilterKind {
    fn name(&self) -> &'static str {
        match self {
            Self::Concept { .. } => "concept",
            Self::QuantityComparator { .. } => "quantity-comparator",
            Self::QuantityRange { .. } => "quantity-range",
            Self::Reference { .. } => "reference",
        }
    }
}

impl AttributeFilter {
    pub fn new(attribute_code: TermCode, kind: AttributeFilterKind) -> Self {
        Self {
            attribute_code,
            kind,
        }
    }

    /// Resolve against `mapping` into alternative filters (combined with OR).
    pub fn expand(&self, mapping: &Mapping, ctx: &MappingContext) -> Result<Vec<ExpandedFilter>> {
        let attribute = mapping.attribute_mapping(&self.attribute_code).ok_or_else(|| {
            FeasibilityError::AttributeMappingNotFound {
                key: mapping.key.clone(),
                attribute: self.attribute_code.clone(),
            }
        })?;
        let search_parameter = attribute.attribute_search_parameter.clone();

        match (&self.kind, attribute.attribute_type) {
            (AttributeFilterKind::Concept { selected_concepts }, attribute_type) => {
                if selected_concepts.is_empty() {
                    return Err(FeasibilityError::invalid_query(format!(
                        "attribute filter {} selects no concepts",
                        self.attribute_code
                    )));
                }
                selected_concepts
                    .iter()
                    .map(|selected| match attribute_type {
                        AttributeType::Code => {
                            Ok(ExpandedFilter::code(search_parameter.clone(), selected.code.clone()))
                        }
                        AttributeType::Coding => {
                            Ok(ExpandedFilter::concept(search_parameter.clone(), selected.clone()))
                        }
                        AttributeType::Composite => Ok(ExpandedFilter::CompositeConcept {
                            search_parameter: search_parameter.clone(),
                            composite_code: self.composite_code(attribute)?,
                            value: selected.clone(),
                        }),
                        AttributeType::Reference => Err(self.mismatch(attribute)),
                    })
                    .collect()
            }
            (
                AttributeFilterKind::QuantityComparator {
                    comparator,
                    value,
                    unit,
                },
                AttributeType::Composite,
            ) => Ok(vec![ExpandedFilter::CompositeQuantityComparator {
                search_parameter,
                composite_code: self.composite_code(attribute)?,
                comparator: *comparator,
                value: *value,
                unit: unit.clone(),
            }]),
            (AttributeFilterKind::QuantityRange { lower, upper, unit }, AttributeType::Composite) => {
                if lower > upper {
                    return Err(FeasibilityError::invalid_query(format!(
                        "attribute filter {} has minValue {lower} above maxValue {upper}",
                        self.attribute_code
                    )));
                }
                Ok(vec![ExpandedFilter::CompositeQuantityRange {
                    search_parameter,
                    composite_code: self.composite_code(attribute)?,
                    lower: *lower,
                    upper: *upper,
                    unit: unit.clone(),
                }])
            }
            (AttributeFilterKind::Reference { criteria }, AttributeType::Reference) => {
                if criteria.is_empty() {
                    return Err(FeasibilityError::invalid_query(format!(
                        "reference filter {} has no criteria",
                        self.attribute_code
                    )));
                }
                let mut filters = Vec::new();
                for criterion in criteria {
                    for expanded in criterion.expand(ctx)? {
                        filters.push(ExpandedFilter::Chained {
                            reference_parameter: format!(
                                "{search_parameter}:{}",
                                expanded.resource_type
                            ),
                            inner: Box::new(expanded.filter),
                        });
                    }
                }
                Ok(filters)
            }
            _ => Err(self.mismatch(attribute)),
        }
    }

    fn composite_code(&self, attribute: &AttributeMapping) -> Result<TermCode> {
        attribute.composite_code.clone().ok_or_else(|| {
            FeasibilityError::invalid_query(format!(
                "composite attribute {} has no composite code",
                self.attribute_code
            ))
        })
    }

    fn mismatch(&self, attribute: &AttributeMapping) -> FeasibilityError {
        FeasibilityError::AttributeTypeMismatch {
            attribute: self.attribute_code.clone(),
            attribute_type: attribute.attribute_type.as_str().to_string(),
            filter: self.kind.name().to_string(),
        }
    }
}
