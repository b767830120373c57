//! Mapping-resolved search filters.

use octofhir_core::{QueryParams, TermCode, format_fhir_date};
use time::Date;

use crate::quantity::{Comparator, Unit, quantity_value};

/// A fully resolved search filter, rendered deterministically to search parameters.
///
/// Filters combine with [`ExpandedFilter::append`]: `Empty` is the identity and
/// groups are flattened, so the rendered parameter order is the append order.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpandedFilter {
    /// Raw code tokens, comma-joined (`status=final,amended`)
    Code {
        search_parameter: String,
        codes: Vec<String>,
    },
    /// Coding tokens, comma-joined (`code=system|code`)
    Concept {
        search_parameter: String,
        term_codes: Vec<TermCode>,
    },
    Comparator {
        search_parameter: String,
        comparator: Comparator,
        value: f64,
        unit: Option<Unit>,
    },
    Range {
        search_parameter: String,
        lower: f64,
        upper: f64,
        unit: Option<Unit>,
    },
    DateComparator {
        search_parameter: String,
        comparator: Comparator,
        date: Date,
    },
    DateRange {
        search_parameter: String,
        lower: Date,
        upper: Date,
    },
    CompositeConcept {
        search_parameter: String,
        composite_code: TermCode,
        value: TermCode,
    },
    CompositeQuantityComparator {
        search_parameter: String,
        composite_code: TermCode,
        comparator: Comparator,
        value: f64,
        unit: Option<Unit>,
    },
    CompositeQuantityRange {
        search_parameter: String,
        composite_code: TermCode,
        lower: f64,
        upper: f64,
        unit: Option<Unit>,
    },
    /// Filter applied to a referenced resource (`{reference_parameter}.{param}`)
    Chained {
        reference_parameter: String,
        inner: Box<ExpandedFilter>,
    },
    Group(Vec<ExpandedFilter>),
    Empty,
}

impl ExpandedFilter {
    pub fn concept(search_parameter: impl Into<String>, term_code: TermCode) -> Self {
        Self::Concept {
            search_parameter: search_parameter.into(),
            term_codes: vec![term_code],
        }
    }

    pub fn code(search_parameter: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Code {
            search_parameter: search_parameter.into(),
            codes: vec![code.into()],
        }
    }

    /// Combine two filters, flattening groups.
    pub fn append(self, other: ExpandedFilter) -> ExpandedFilter {
        match (self, other) {
            (Self::Empty, filter) | (filter, Self::Empty) => filter,
            (Self::Group(mut left), Self::Group(right)) => {
                left.extend(right);
                Self::Group(left)
            }
            (Self::Group(mut left), right) => {
                left.push(right);
                Self::Group(left)
            }
            (left, Self::Group(right)) => {
                let mut filters = Vec::with_capacity(right.len() + 1);
                filters.push(left);
                filters.extend(right);
                Self::Group(filters)
            }
            (left, right) => Self::Group(vec![left, right]),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Group(filters) => filters.iter().all(Self::is_empty),
            _ => false,
        }
    }

    /// Render the filter as search parameters.
    pub fn to_params(&self) -> QueryParams {
        match self {
            Self::Code {
                search_parameter,
                codes,
            } => QueryParams::of(search_parameter.as_str(), codes.join(",")),
            Self::Concept {
                search_parameter,
                term_codes,
            } => QueryParams::of(
                search_parameter.as_str(),
                term_codes
                    .iter()
                    .map(TermCode::search_value)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Self::Comparator {
                search_parameter,
                comparator,
                value,
                unit,
            } => QueryParams::of(
                search_parameter.as_str(),
                quantity_value(*comparator, *value, unit.as_ref()),
            ),
            Self::Range {
                search_parameter,
                lower,
                upper,
                unit,
            } => QueryParams::of(
                search_parameter.as_str(),
                quantity_value(Comparator::Ge, *lower, unit.as_ref()),
            )
            .append_param(
                search_parameter.as_str(),
                quantity_value(Comparator::Le, *upper, unit.as_ref()),
            ),
            Self::DateComparator {
                search_parameter,
                comparator,
                date,
            } => QueryParams::of(
                search_parameter.as_str(),
                format!("{}{}", comparator.prefix(), format_fhir_date(*date)),
            ),
            Self::DateRange {
                search_parameter,
                lower,
                upper,
            } => QueryParams::of(
                search_parameter.as_str(),
                format!("ge{}", format_fhir_date(*lower)),
            )
            .append_param(
                search_parameter.as_str(),
                format!("le{}", format_fhir_date(*upper)),
            ),
            Self::CompositeConcept {
                search_parameter,
                composite_code,
                value,
            } => QueryParams::of(
                search_parameter.as_str(),
                composite_value(composite_code, &value.search_value()),
            ),
            Self::CompositeQuantityComparator {
                search_parameter,
                composite_code,
                comparator,
                value,
                unit,
            } => QueryParams::of(
                search_parameter.as_str(),
                composite_value(
                    composite_code,
                    &quantity_value(*comparator, *value, unit.as_ref()),
                ),
            ),
            Self::CompositeQuantityRange {
                search_parameter,
                composite_code,
                lower,
                upper,
                unit,
            } => QueryParams::of(
                search_parameter.as_str(),
                composite_value(
                    composite_code,
                    &quantity_value(Comparator::Ge, *lower, unit.as_ref()),
                ),
            )
            .append_param(
                search_parameter.as_str(),
                composite_value(
                    composite_code,
                    &quantity_value(Comparator::Le, *upper, unit.as_ref()),
                ),
            ),
            Self::Chained {
                reference_parameter,
                inner,
            } => inner.to_params().prefix_names(reference_parameter),
            Self::Group(filters) => filters
                .iter()
                .fold(QueryParams::empty(), |params, filter| {
                    params.append_params(filter.to_params())
                }),
            Self::Empty => QueryParams::empty(),
        }
    }
}

fn composite_value(composite_code: &TermCode, value: &str) -> String {
    format!("{}${value}", composite_code.search_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn loinc(code: &str) -> TermCode {
        TermCode::new("http://loinc.org", code, "")
    }

    fn render(filter: &ExpandedFilter) -> String {
        filter.to_params().to_string()
    }

    #[test]
    fn test_empty_is_append_identity() {
        let filter = ExpandedFilter::concept("code", loinc("718-7"));
        assert_eq!(filter.clone().append(ExpandedFilter::Empty), filter);
        assert_eq!(ExpandedFilter::Empty.append(filter.clone()), filter);
        assert!(ExpandedFilter::Empty.append(ExpandedFilter::Empty).is_empty());
    }

    #[test]
    fn test_append_flattens_groups() {
        let a = ExpandedFilter::code("status", "final");
        let b = ExpandedFilter::concept("code", loinc("718-7"));
        let c = ExpandedFilter::code("category", "laboratory");

        let left = a.clone().append(b.clone()).append(c.clone());
        let right = a.clone().append(b.clone().append(c.clone()));

        assert_eq!(left, ExpandedFilter::Group(vec![a, b, c]));
        assert_eq!(left, right);
    }

    #[test]
    fn test_render_value_filters() {
        let comparator = ExpandedFilter::Comparator {
            search_parameter: "value-quantity".into(),
            comparator: Comparator::Ge,
            value: 5.0,
            unit: Some(Unit::new("kg")),
        };
        assert_eq!(
            render(&comparator),
            "value-quantity=ge5|http://unitsofmeasure.org|kg"
        );

        let range = ExpandedFilter::Range {
            search_parameter: "value-quantity".into(),
            lower: 1.5,
            upper: 3.0,
            unit: None,
        };
        assert_eq!(render(&range), "value-quantity=ge1.5&value-quantity=le3");
    }

    #[test]
    fn test_render_dates() {
        let comparator = ExpandedFilter::DateComparator {
            search_parameter: "birthdate".into(),
            comparator: Comparator::Le,
            date: date!(1990 - 01 - 01),
        };
        assert_eq!(render(&comparator), "birthdate=le1990-01-01");

        let range = ExpandedFilter::DateRange {
            search_parameter: "recorded-date".into(),
            lower: date!(2020 - 01 - 01),
            upper: date!(2020 - 12 - 31),
        };
        assert_eq!(
            render(&range),
            "recorded-date=ge2020-01-01&recorded-date=le2020-12-31"
        );
    }

    #[test]
    fn test_render_composites() {
        let concept = ExpandedFilter::CompositeConcept {
            search_parameter: "component-code-value-concept".into(),
            composite_code: loinc("72166-2"),
            value: TermCode::new("http://snomed.info/sct", "77176002", ""),
        };
        assert_eq!(
            render(&concept),
            "component-code-value-concept=http://loinc.org|72166-2$http://snomed.info/sct|77176002"
        );

        let quantity = ExpandedFilter::CompositeQuantityComparator {
            search_parameter: "component-code-value-quantity".into(),
            composite_code: loinc("8480-6"),
            comparator: Comparator::Lt,
            value: 60.0,
            unit: Some(Unit::new("mm[Hg]")),
        };
        assert_eq!(
            render(&quantity),
            "component-code-value-quantity=http://loinc.org|8480-6$lt60|http://unitsofmeasure.org|mm[Hg]"
        );

        let range = ExpandedFilter::CompositeQuantityRange {
            search_parameter: "component-code-value-quantity".into(),
            composite_code: loinc("8480-6"),
            lower: 90.0,
            upper: 120.0,
            unit: None,
        };
        assert_eq!(
            render(&range),
            "component-code-value-quantity=http://loinc.org|8480-6$ge90&component-code-value-quantity=http://loinc.org|8480-6$le120"
        );
    }

    #[test]
    fn test_render_chained_group() {
        let inner = ExpandedFilter::concept("code", TermCode::new("http://snomed.info/sct", "119297000", ""))
            .append(ExpandedFilter::code("status", "available"));
        let chained = ExpandedFilter::Chained {
            reference_parameter: "specimen:Specimen".into(),
            inner: Box::new(inner),
        };
        let filter = ExpandedFilter::concept("code", loinc("718-7")).append(chained);

        assert_eq!(
            render(&filter),
            "code=http://loinc.org|718-7&specimen:Specimen.code=http://snomed.info/sct|119297000&specimen:Specimen.status=available"
        );
    }

    #[test]
    fn test_multi_value_tokens_are_comma_joined() {
        let filter = ExpandedFilter::Concept {
            search_parameter: "code".into(),
            term_codes: vec![loinc("718-7"), loinc("59260-0")],
        };
        assert_eq!(
            render(&filter),
            "code=http://loinc.org|718-7,http://loinc.org|59260-0"
        );
    }
}
