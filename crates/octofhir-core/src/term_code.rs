//! Coded clinical identifiers.
//!
//! A [`TermCode`] identifies one coding in one code system. Equality, hashing and
//! ordering only look at `system` and `code`; the display text and version are
//! informational and never influence lookups or rendered search requests.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A single coding: `(system, code, display)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermCode {
    pub system: String,
    pub code: String,
    #[serde(default)]
    pub display: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl TermCode {
    pub fn new(
        system: impl Into<String>,
        code: impl Into<String>,
        display: impl Into<String>,
    ) -> Self {
        Self {
            system: system.into(),
            code: code.into(),
            display: display.into(),
            version: None,
        }
    }

    /// Render the coding as a FHIR token search value (`system|code`).
    pub fn search_value(&self) -> String {
        format!("{}|{}", self.system, self.code)
    }
}

impl PartialEq for TermCode {
    fn eq(&self, other: &Self) -> bool {
        self.system == other.system && self.code == other.code
    }
}

impl Eq for TermCode {}

impl Hash for TermCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.system.hash(state);
        self.code.hash(state);
    }
}

impl PartialOrd for TermCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TermCode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.system
            .cmp(&other.system)
            .then_with(|| self.code.cmp(&other.code))
    }
}

impl fmt::Display for TermCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.system, self.code)?;
        if !self.display.is_empty() {
            write!(f, " ({})", self.display)?;
        }
        Ok(())
    }
}

/// A term code qualified by the context it is used in (e.g. "Diagnosis").
///
/// Mappings are keyed by contextual term codes, so the same coding can map to
/// different resource types depending on its context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextualTermCode {
    pub context: TermCode,
    pub term_code: TermCode,
}

impl ContextualTermCode {
    pub fn new(context: TermCode, term_code: TermCode) -> Self {
        Self { context, term_code }
    }
}

impl fmt::Display for ContextualTermCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}|{}] {}",
            self.context.system, self.context.code, self.term_code
        )
    }
}

/// One or more alternative codings of a single meaning. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<TermCode>", into = "Vec<TermCode>")]
pub struct Concept {
    term_codes: Vec<TermCode>,
}

impl Concept {
    /// Create a concept from a non-empty list of term codes.
    pub fn new(term_codes: Vec<TermCode>) -> Result<Self, CoreError> {
        if term_codes.is_empty() {
            return Err(CoreError::EmptyConcept);
        }
        Ok(Self { term_codes })
    }

    /// Create a concept with a single coding.
    pub fn of(term_code: TermCode) -> Self {
        Self {
            term_codes: vec![term_code],
        }
    }

    pub fn term_codes(&self) -> &[TermCode] {
        &self.term_codes
    }
}

impl TryFrom<Vec<TermCode>> for Concept {
    type Error = CoreError;

    fn try_from(term_codes: Vec<TermCode>) -> Result<Self, Self::Error> {
        Self::new(term_codes)
    }
}

impl From<Concept> for Vec<TermCode> {
    fn from(concept: Concept) -> Self {
        concept.term_codes
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<String> = self.term_codes.iter().map(TermCode::search_value).collect();
        write!(f, "[{}]", codes.join(", "))
    }
}

/// A [`Concept`] qualified by a context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextualConcept {
    pub context: TermCode,
    pub concept: Concept,
}

impl ContextualConcept {
    pub fn new(context: TermCode, concept: Concept) -> Self {
        Self { context, concept }
    }

    /// All codings of the concept paired with the concept's context, in order.
    pub fn contextual_term_codes(&self) -> impl Iterator<Item = ContextualTermCode> + '_ {
        self.concept
            .term_codes()
            .iter()
            .map(|tc| ContextualTermCode::new(self.context.clone(), tc.clone()))
    }
}

impl fmt::Display for ContextualConcept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}|{}] {}",
            self.context.system, self.context.code, self.concept
        )
    }
}
