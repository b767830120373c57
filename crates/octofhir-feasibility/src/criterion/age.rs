//! Age filters rendered as birth date filters.
//!
//! With `b(x)` the latest birth date of someone aged `x` today (`today - x`),
//! a person is older than `x` exactly when born on or before `b(x + 1)`:
//!
//! | age filter | birth date filter            |
//! |------------|------------------------------|
//! | `gt x`     | `le b(x+1)`                  |
//! | `ge x`     | `le b(x)`                    |
//! | `lt x`     | `gt b(x)`                    |
//! | `le x`     | `gt b(x+1)`                  |
//! | `eq x`     | `[b(x+1) + 1 day, b(x)]`     |
//! | `[l, u]`   | `[b(u+1) + 1 day, b(l)]`     |

use time::{Date, Duration, Month};

use crate::error::{FeasibilityError, Result};
use crate::expanded::ExpandedFilter;
use crate::quantity::{Comparator, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgeUnit {
    Years,
    Months,
    Weeks,
    Days,
}

impl AgeUnit {
    fn parse(unit: Option<&Unit>) -> Result<Self> {
        let unit = unit.ok_or_else(|| FeasibilityError::calculation("age value without a unit"))?;
        match unit.code.as_str() {
            "a" => Ok(Self::Years),
            "mo" => Ok(Self::Months),
            "wk" => Ok(Self::Weeks),
            "d" => Ok(Self::Days),
            other => Err(FeasibilityError::calculation(format!(
                "unsupported age unit '{other}'"
            ))),
        }
    }
}

pub(crate) fn comparator_filter(
    search_parameter: &str,
    comparator: Comparator,
    value: f64,
    unit: Option<&Unit>,
    today: Date,
) -> Result<ExpandedFilter> {
    let unit = AgeUnit::parse(unit)?;
    let age = whole_age(value)?;
    let birth = |age: i64| birth_date(today, age, unit);

    let filter = match comparator {
        Comparator::Gt => date_comparator(search_parameter, Comparator::Le, birth(age + 1)?),
        Comparator::Ge => date_comparator(search_parameter, Comparator::Le, birth(age)?),
        Comparator::Lt => date_comparator(search_parameter, Comparator::Gt, birth(age)?),
        Comparator::Le => date_comparator(search_parameter, Comparator::Gt, birth(age + 1)?),
        Comparator::Eq => date_range(search_parameter, next_day(birth(age + 1)?)?, birth(age)?),
    };
    Ok(filter)
}

pub(crate) fn range_filter(
    search_parameter: &str,
    lower: f64,
    upper: f64,
    unit: Option<&Unit>,
    today: Date,
) -> Result<ExpandedFilter> {
    let unit = AgeUnit::parse(unit)?;
    let (lower, upper) = (whole_age(lower)?, whole_age(upper)?);
    if lower > upper {
        return Err(FeasibilityError::calculation(format!(
            "age range lower bound {lower} exceeds upper bound {upper}"
        )));
    }

    let earliest = next_day(birth_date(today, upper + 1, unit)?)?;
    let latest = birth_date(today, lower, unit)?;
    Ok(date_range(search_parameter, earliest, latest))
}

fn whole_age(value: f64) -> Result<i64> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(FeasibilityError::calculation(format!(
            "age must be a non-negative whole number, got {value}"
        )));
    }
    if value > f64::from(u16::MAX) {
        return Err(FeasibilityError::calculation(format!("age {value} is out of range")));
    }
    Ok(value as i64)
}

fn birth_date(today: Date, age: i64, unit: AgeUnit) -> Result<Date> {
    let out_of_range =
        || FeasibilityError::calculation(format!("birth date for age {age} is out of range"));
    match unit {
        AgeUnit::Years => months_before(today, age * 12),
        AgeUnit::Months => months_before(today, age),
        AgeUnit::Weeks => today.checked_sub(Duration::weeks(age)).ok_or_else(out_of_range),
        AgeUnit::Days => today.checked_sub(Duration::days(age)).ok_or_else(out_of_range),
    }
}

/// Subtract calendar months, clamping the day to the target month's length.
fn months_before(date: Date, months: i64) -> Result<Date> {
    let out_of_range =
        |e: time::error::ComponentRange| FeasibilityError::calculation(e.to_string());

    let total = i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1 - months;
    let year = i32::try_from(total.div_euclid(12))
        .map_err(|_| FeasibilityError::calculation("birth date year is out of range"))?;
    let month = Month::try_from(total.rem_euclid(12) as u8 + 1).map_err(out_of_range)?;
    let day = date.day().min(month.length(year));
    Date::from_calendar_date(year, month, day).map_err(out_of_range)
}

fn next_day(date: Date) -> Result<Date> {
    date.next_day()
        .ok_or_else(|| FeasibilityError::calculation("birth date is out of range"))
}

fn date_comparator(search_parameter: &str, comparator: Comparator, date: Date) -> ExpandedFilter {
    ExpandedFilter::DateComparator {
        search_parameter: search_parameter.to_string(),
        comparator,
        date,
    }
}

fn date_range(search_parameter: &str, lower: Date, upper: Date) -> ExpandedFilter {
    ExpandedFilter::DateRange {
        search_parameter: search_parameter.to_string(),
        lower,
        upper,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    const TODAY: Date = date!(2024 - 06 - 15);

    fn years() -> Option<Unit> {
        Some(Unit::new("a"))
    }

    fn render(filter: ExpandedFilter) -> String {
        filter.to_params().to_string()
    }

    fn comparator(c: Comparator, value: f64) -> String {
        render(comparator_filter("birthdate", c, value, years().as_ref(), TODAY).unwrap())
    }

    #[test]
    fn test_comparators_in_years() {
        assert_eq!(comparator(Comparator::Gt, 30.0), "birthdate=le1993-06-15");
        assert_eq!(comparator(Comparator::Ge, 30.0), "birthdate=le1994-06-15");
        assert_eq!(comparator(Comparator::Lt, 30.0), "birthdate=gt1994-06-15");
        assert_eq!(comparator(Comparator::Le, 30.0), "birthdate=gt1993-06-15");
    }

    #[test]
    fn test_equal_age_spans_one_year_of_birth_dates() {
        assert_eq!(
            comparator(Comparator::Eq, 30.0),
            "birthdate=ge1993-06-16&birthdate=le1994-06-15"
        );
    }

    #[test]
    fn test_range() {
        let filter = range_filter("birthdate", 18.0, 65.0, years().as_ref(), TODAY).unwrap();
        assert_eq!(render(filter), "birthdate=ge1958-06-16&birthdate=le2006-06-15");
    }

    #[test]
    fn test_other_units() {
        let months = Unit::new("mo");
        let weeks = Unit::new("wk");
        let days = Unit::new("d");

        let f = comparator_filter("birthdate", Comparator::Ge, 18.0, Some(&months), TODAY).unwrap();
        assert_eq!(render(f), "birthdate=le2022-12-15");
        let f = comparator_filter("birthdate", Comparator::Ge, 2.0, Some(&weeks), TODAY).unwrap();
        assert_eq!(render(f), "birthdate=le2024-06-01");
        let f = comparator_filter("birthdate", Comparator::Ge, 15.0, Some(&days), TODAY).unwrap();
        assert_eq!(render(f), "birthdate=le2024-05-31");
    }

    #[test]
    fn test_month_end_is_clamped() {
        assert_eq!(months_before(date!(2024 - 03 - 31), 1).unwrap(), date!(2024 - 02 - 29));
        assert_eq!(months_before(date!(2024 - 02 - 29), 12).unwrap(), date!(2023 - 02 - 28));
        assert_eq!(months_before(date!(2024 - 01 - 10), 13).unwrap(), date!(2022 - 12 - 10));
    }

    #[test]
    fn test_invalid_ages_are_calculation_errors() {
        let calc = |r: Result<ExpandedFilter>| matches!(r, Err(FeasibilityError::Calculation(_)));

        assert!(calc(comparator_filter("birthdate", Comparator::Gt, -1.0, years().as_ref(), TODAY)));
        assert!(calc(comparator_filter("birthdate", Comparator::Gt, 2.5, years().as_ref(), TODAY)));
        assert!(calc(comparator_filter("birthdate", Comparator::Gt, 2.0, None, TODAY)));
        assert!(calc(comparator_filter(
            "birthdate",
            Comparator::Gt,
            2.0,
            Some(&Unit::new("h")),
            TODAY
        )));
        assert!(calc(range_filter("birthdate", 65.0, 18.0, years().as_ref(), TODAY)));
    }
}
