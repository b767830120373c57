//! Criterion groups and structured queries.

use std::ops::Deref;

use octofhir_core::CoreError;
use serde::{Deserialize, Deserializer, Serialize};

use crate::criterion::Criterion;

/// A non-empty ordered list.
///
/// Whether the elements combine with AND or OR depends on the nesting level in
/// the [`StructuredQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<T>", into = "Vec<T>")]
#[serde(bound(
    serialize = "T: Serialize + Clone",
    deserialize = "T: Deserialize<'de>"
))]
pub struct CriterionGroup<T> {
    elements: Vec<T>,
}

impl<T> CriterionGroup<T> {
    pub fn new(elements: Vec<T>) -> Result<Self, CoreError> {
        if elements.is_empty() {
            return Err(CoreError::EmptyGroup);
        }
        Ok(Self { elements })
    }

    pub fn of(element: T) -> Self {
        Self {
            elements: vec![element],
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.elements
    }
}

impl<T> Deref for CriterionGroup<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.elements
    }
}

impl<T> TryFrom<Vec<T>> for CriterionGroup<T> {
    type Error = CoreError;

    fn try_from(elements: Vec<T>) -> Result<Self, Self::Error> {
        Self::new(elements)
    }
}

impl<T> From<CriterionGroup<T>> for Vec<T> {
    fn from(group: CriterionGroup<T>) -> Self {
        group.elements
    }
}

/// Criteria in conjunctive normal form: AND over groups, OR within a group.
pub type Cnf = CriterionGroup<CriterionGroup<Criterion>>;

/// A feasibility query: patients matching the inclusion criteria and none of the
/// exclusion criteria.
///
/// Inclusion criteria are AND-of-OR (`[[A, B], [C]]` is `(A ∨ B) ∧ C`).
/// Exclusion criteria are OR-of-AND (`[[A, B], [C]]` is `(A ∧ B) ∨ C`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    pub inclusion_criteria: Cnf,

    /// An empty list is treated like an absent one
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclusion_criteria: Option<Cnf>,
}

impl StructuredQuery {
    pub fn new(inclusion_criteria: Cnf, exclusion_criteria: Option<Cnf>) -> Self {
        Self {
            version: None,
            display: None,
            inclusion_criteria,
            exclusion_criteria,
        }
    }

    /// Every criterion, inclusion first, in document order.
    pub fn criteria(&self) -> impl Iterator<Item = &Criterion> {
        self.inclusion_criteria
            .iter()
            .chain(self.exclusion_criteria.iter().flat_map(|groups| groups.iter()))
            .flat_map(|group| group.iter())
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<Cnf>, D::Error>
where
    D: Deserializer<'de>,
{
    let groups = Option::<Vec<CriterionGroup<Criterion>>>::deserialize(deserializer)?;
    match groups {
        None => Ok(None),
        Some(groups) if groups.is_empty() => Ok(None),
        Some(groups) => CriterionGroup::new(groups)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
