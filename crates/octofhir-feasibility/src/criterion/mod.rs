//! Criteria of a structured query and their expansion into searches.
//!
//! A criterion names a contextual concept and optionally restricts it by value,
//! by attributes of the matching resource and by time. The kind of criterion is
//! decided by its value filter:
//!
//! | value filter          | criterion            |
//! |-----------------------|----------------------|
//! | none                  | concept              |
//! | `concept`             | value set            |
//! | `quantity-comparator` | quantity comparator  |
//! | `quantity-range`      | quantity range       |
//!
//! [`Criterion::expand`] resolves a criterion against a [`MappingContext`] into
//! one [`ExpandedCriterion`] per combination of expanded term code, selected
//! value concept and attribute alternative, in that nesting order.

mod age;
mod attribute;
mod time_restriction;

pub use attribute::{AttributeFilter, AttributeFilterKind};
pub use time_restriction::TimeRestriction;

use octofhir_core::{Concept, ContextualConcept, ContextualTermCode, TermCode};
use serde::{Deserialize, Serialize};

use crate::error::{FeasibilityError, Result};
use crate::expanded::{ExpandedCriterion, ExpandedFilter};
use crate::mapping::{Mapping, MappingContext, ValueType};
use crate::quantity::{Comparator, Unit};

/// Restriction on the value of the matching resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ValueFilter {
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
}

/// One atomic constraint of a structured query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub context: TermCode,
    pub term_codes: Concept,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_filter: Option<ValueFilter>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_filters: Vec<AttributeFilter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_restriction: Option<TimeRestriction>,
}

impl Criterion {
    /// A plain concept criterion.
    pub fn concept(concept: ContextualConcept) -> Self {
        Self {
            context: concept.context,
            term_codes: concept.concept,
            value_filter: None,
            attribute_filters: Vec::new(),
            time_restriction: None,
        }
    }

    /// A value set criterion: the value is any of `selected_concepts`.
    pub fn value_set(concept: ContextualConcept, selected_concepts: Vec<TermCode>) -> Self {
        Self::concept(concept).with_value_filter(ValueFilter::Concept { selected_concepts })
    }

    pub fn quantity_comparator(
        concept: ContextualConcept,
        comparator: Comparator,
        value: f64,
        unit: Option<Unit>,
    ) -> Self {
        Self::concept(concept).with_value_filter(ValueFilter::QuantityComparator {
            comparator,
            value,
            unit,
        })
    }

    pub fn quantity_range(
        concept: ContextualConcept,
        lower: f64,
        upper: f64,
        unit: Option<Unit>,
    ) -> Self {
        Self::concept(concept).with_value_filter(ValueFilter::QuantityRange { lower, upper, unit })
    }

    pub fn with_value_filter(mut self, value_filter: ValueFilter) -> Self {
        self.value_filter = Some(value_filter);
        self
    }

    pub fn with_attribute_filter(mut self, filter: AttributeFilter) -> Self {
        self.attribute_filters.push(filter);
        self
    }

    pub fn with_time_restriction(mut self, time_restriction: TimeRestriction) -> Self {
        self.time_restriction = Some(time_restriction);
        self
    }

    pub fn contextual_concept(&self) -> ContextualConcept {
        ContextualConcept::new(self.context.clone(), self.term_codes.clone())
    }

    /// Expand into mapping-resolved criteria, in a deterministic order.
    pub fn expand(&self, ctx: &MappingContext) -> Result<Vec<ExpandedCriterion>> {
        let term_codes = ctx.expand_concept(&self.contextual_concept())?;

        let mut expanded = Vec::new();
        for term_code in &term_codes {
            expanded.extend(self.expand_term_code(ctx, term_code)?);
        }
        Ok(expanded)
    }

    fn expand_term_code(
        &self,
        ctx: &MappingContext,
        term_code: &TermCode,
    ) -> Result<Vec<ExpandedCriterion>> {
        let key = ContextualTermCode::new(self.context.clone(), term_code.clone());
        let mapping = ctx.find_mapping(&key)?;

        let base =
            ExpandedCriterion::new(mapping.resource_type.clone(), mapping.base_filter(term_code));
        let values = self.value_filters(mapping, ctx)?;
        let attributes = self.attribute_combinations(mapping, ctx)?;
        let time = self.time_filter(mapping)?;

        let mut expanded = Vec::with_capacity(values.len() * attributes.len());
        for value in &values {
            for attribute in &attributes {
                expanded.push(
                    base.clone()
                        .append_filter(value.clone())
                        .append_filter(attribute.clone())
                        .append_filter(time.clone()),
                );
            }
        }
        Ok(expanded)
    }

    fn value_filters(
        &self,
        mapping: &Mapping,
        ctx: &MappingContext,
    ) -> Result<Vec<ExpandedFilter>> {
        let Some(value_filter) = &self.value_filter else {
            return Ok(vec![ExpandedFilter::Empty]);
        };
        let search_parameter = mapping
            .value_search_parameter
            .as_deref()
            .ok_or_else(|| FeasibilityError::MissingValueSearchParameter(mapping.key.clone()))?;

        match value_filter {
            ValueFilter::Concept { selected_concepts } => {
                if selected_concepts.is_empty() {
                    return Err(FeasibilityError::invalid_query(format!(
                        "value filter of {} selects no concepts",
                        mapping.key
                    )));
                }
                match mapping.value_type {
                    Some(ValueType::Quantity | ValueType::Age) => {
                        Err(self.value_type_mismatch(mapping, "concept"))
                    }
                    Some(ValueType::Code) => Ok(selected_concepts
                        .iter()
                        .map(|selected| {
                            ExpandedFilter::code(search_parameter, selected.code.clone())
                        })
                        .collect()),
                    Some(ValueType::Concept) | None => Ok(selected_concepts
                        .iter()
                        .map(|selected| ExpandedFilter::concept(search_parameter, selected.clone()))
                        .collect()),
                }
            }
            ValueFilter::QuantityComparator {
                comparator,
                value,
                unit,
            } => match mapping.value_type {
                Some(ValueType::Age) => Ok(vec![age::comparator_filter(
                    search_parameter,
                    *comparator,
                    *value,
                    unit.as_ref(),
                    ctx.today(),
                )?]),
                Some(ValueType::Code | ValueType::Concept) => {
                    Err(self.value_type_mismatch(mapping, "quantity"))
                }
                Some(ValueType::Quantity) | None => Ok(vec![ExpandedFilter::Comparator {
                    search_parameter: search_parameter.to_string(),
                    comparator: *comparator,
                    value: *value,
                    unit: unit.clone(),
                }]),
            },
            ValueFilter::QuantityRange { lower, upper, unit } => match mapping.value_type {
                Some(ValueType::Age) => Ok(vec![age::range_filter(
                    search_parameter,
                    *lower,
                    *upper,
                    unit.as_ref(),
                    ctx.today(),
                )?]),
                Some(ValueType::Code | ValueType::Concept) => {
                    Err(self.value_type_mismatch(mapping, "quantity"))
                }
                Some(ValueType::Quantity) | None => {
                    if lower > upper {
                        return Err(FeasibilityError::invalid_query(format!(
                            "value filter of {} has minValue {lower} above maxValue {upper}",
                            mapping.key
                        )));
                    }
                    Ok(vec![ExpandedFilter::Range {
                        search_parameter: search_parameter.to_string(),
                        lower: *lower,
                        upper: *upper,
                        unit: unit.clone(),
                    }])
                }
            },
        }
    }

    /// Cartesian product of every attribute filter's alternatives.
    fn attribute_combinations(
        &self,
        mapping: &Mapping,
        ctx: &MappingContext,
    ) -> Result<Vec<ExpandedFilter>> {
        let mut combinations = vec![ExpandedFilter::Empty];
        for filter in &self.attribute_filters {
            let alternatives = filter.expand(mapping, ctx)?;
            combinations = combinations
                .iter()
                .flat_map(|prefix| {
                    alternatives
                        .iter()
                        .map(move |alternative| prefix.clone().append(alternative.clone()))
                })
                .collect();
        }
        Ok(combinations)
    }

    fn time_filter(&self, mapping: &Mapping) -> Result<ExpandedFilter> {
        let Some(restriction) = &self.time_restriction else {
            return Ok(ExpandedFilter::Empty);
        };
        let search_parameter = mapping
            .time_restriction_parameter
            .as_deref()
            .ok_or_else(|| FeasibilityError::MissingTimeRestrictionParameter(mapping.key.clone()))?;
        restriction.to_filter(search_parameter)
    }

    fn value_type_mismatch(&self, mapping: &Mapping, filter: &str) -> FeasibilityError {
        FeasibilityError::invalid_query(format!(
            "{filter} value filter on {} whose value type is {:?}",
            mapping.key, mapping.value_type
        ))
    }
}
