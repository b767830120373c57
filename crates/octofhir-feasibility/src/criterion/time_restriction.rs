use octofhir_core::date::fhir_date;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::error::{FeasibilityError, Result};
use crate::expanded::ExpandedFilter;
use crate::quantity::Comparator;

/// Restricts the clinical time of a criterion to an open or closed date interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRestriction {
    #[serde(default, with = "fhir_date::option", skip_serializing_if = "Option::is_none")]
    pub after_date: Option<Date>,

    #[serde(default, with = "fhir_date::option", skip_serializing_if = "Option::is_none")]
    pub before_date: Option<Date>,
}

impl TimeRestriction {
    pub fn new(after_date: Option<Date>, before_date: Option<Date>) -> Self {
        Self {
            after_date,
            before_date,
        }
    }

    /// Render as a filter on `search_parameter`.
    pub fn to_filter(&self, search_parameter: &str) -> Result<ExpandedFilter> {
        let search_parameter = search_parameter.to_string();
        match (self.after_date, self.before_date) {
            (Some(after), Some(before)) if after > before => {
                Err(FeasibilityError::invalid_query(format!(
                    "time restriction starts after it ends ({after} > {before})"
                )))
            }
            (Some(lower), Some(upper)) => Ok(ExpandedFilter::DateRange {
                search_parameter,
                lower,
                upper,
            }),
            (Some(date), None) => Ok(ExpandedFilter::DateComparator {
                search_parameter,
                comparator: Comparator::Ge,
                date,
            }),
            (None, Some(date)) => Ok(ExpandedFilter::DateComparator {
                search_parameter,
                comparator: Comparator::Le,
                date,
            }),
            (None, None) => Err(FeasibilityError::invalid_query(
                "time restriction without afterDate or beforeDate",
            )),
        }
    }
}
