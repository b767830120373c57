//! Quantity comparators and units.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Code system of every rendered quantity unit.
pub const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

/// Comparison operator, serialised and rendered as its FHIR search prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Le,
    Lt,
    Ge,
    Gt,
}

impl Comparator {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Le => "le",
            Self::Lt => "lt",
            Self::Ge => "ge",
            Self::Gt => "gt",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A UCUM unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    pub code: String,
    #[serde(default)]
    pub display: String,
}

impl Unit {
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            display: code.clone(),
            code,
        }
    }
}

/// Render a quantity search value: `{prefix}{value}[|{UCUM}|{unit}]`.
pub(crate) fn quantity_value(comparator: Comparator, value: f64, unit: Option<&Unit>) -> String {
    match unit {
        Some(unit) => format!("{}{value}|{UCUM_SYSTEM}|{}", comparator.prefix(), unit.code),
        None => format!("{}{value}", comparator.prefix()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparator_serde_uses_search_prefixes() {
        let comparators: Vec<Comparator> = serde_json::from_str(r#"["eq","le","lt","ge","gt"]"#).unwrap();
        let prefixes: Vec<&str> = comparators.iter().map(|c| c.prefix()).collect();
        assert_eq!(prefixes, vec!["eq", "le", "lt", "ge", "gt"]);
    }

    #[test]
    fn test_quantity_value() {
        assert_eq!(
            quantity_value(Comparator::Gt, 5.5, Some(&Unit::new("g/dL"))),
            "gt5.5|http://unitsofmeasure.org|g/dL"
        );
        assert_eq!(quantity_value(Comparator::Le, 10.0, None), "le10");
    }
}
