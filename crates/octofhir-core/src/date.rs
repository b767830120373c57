//! FHIR `date` helpers.

use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::error::{CoreError, Result};

/// Parse a FHIR date (`YYYY-MM-DD`). A trailing time part (`T...`) is ignored.
pub fn parse_fhir_date(value: &str) -> Result<Date> {
    let date_part = value.split('T').next().unwrap_or(value);
    Date::parse(date_part, format_description!("[year]-[month]-[day]"))
        .map_err(|e| CoreError::invalid_date(format!("'{value}': {e}")))
}

/// Format a date as a FHIR date (`YYYY-MM-DD`).
pub fn format_fhir_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Today's date in UTC.
pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Serde adapter for `time::Date` fields in FHIR date format.
pub mod fhir_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S>(date: &Date, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_fhir_date(*date))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Date, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_fhir_date(&s).map_err(serde::de::Error::custom)
    }

    /// Same as the parent module for `Option<Date>` fields.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use time::Date;

        pub fn serialize<S>(date: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match date {
                Some(date) => serializer.serialize_str(&super::super::format_fhir_date(*date)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| super::super::parse_fhir_date(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
