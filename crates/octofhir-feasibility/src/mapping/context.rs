//! Immutable mapping table plus expansion tree.

use std::collections::HashMap;

use octofhir_core::{ContextualConcept, ContextualTermCode, TermCode, today_utc};
use time::Date;

use super::model::Mapping;
use super::tree::MappingTree;
use crate::error::{FeasibilityError, Result};

/// Source of "today" for age arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Current UTC date
    #[default]
    System,
    Fixed(Date),
}

impl Clock {
    pub fn today(self) -> Date {
        match self {
            Self::System => today_utc(),
            Self::Fixed(date) => date,
        }
    }
}

/// Everything needed to translate criteria into searches.
///
/// Built once at startup and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct MappingContext {
    mappings: HashMap<ContextualTermCode, Mapping>,
    tree: Option<MappingTree>,
    clock: Clock,
}

impl MappingContext {
    /// Index `mappings` by contextual key. For duplicate keys the later mapping wins.
    pub fn new(mappings: impl IntoIterator<Item = Mapping>, tree: Option<MappingTree>) -> Self {
        let mut indexed = HashMap::new();
        for mapping in mappings {
            let key = mapping.contextual_key();
            if indexed.contains_key(&key) {
                tracing::warn!(key = %key, "Duplicate mapping key, keeping the later mapping");
            }
            indexed.insert(key, mapping);
        }
        Self {
            mappings: indexed,
            tree,
            clock: Clock::System,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn today(&self) -> Date {
        self.clock.today()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn has_tree(&self) -> bool {
        self.tree.is_some()
    }

    pub fn find_mapping(&self, key: &ContextualTermCode) -> Result<&Mapping> {
        self.mappings
            .get(key)
            .ok_or_else(|| FeasibilityError::MappingNotFound(key.clone()))
    }

    /// Resolve a concept to the term codes to search for, in order.
    ///
    /// Without a tree the concept's own codings are kept when they are mapped.
    /// With a tree every coding is expanded within the concept's context. An
    /// empty result is an error.
    pub fn expand_concept(&self, concept: &ContextualConcept) -> Result<Vec<TermCode>> {
        match &self.tree {
            None => {
                let mapped: Vec<TermCode> = concept
                    .contextual_term_codes()
                    .filter(|key| self.mappings.contains_key(key))
                    .map(|key| key.term_code)
                    .collect();
                if mapped.is_empty() {
                    return Err(FeasibilityError::ConceptNotExpandable(concept.to_string()));
                }
                Ok(mapped)
            }
            Some(tree) => {
                let expanded: Vec<TermCode> = concept
                    .concept
                    .term_codes()
                    .iter()
                    .filter_map(|tc| tree.expand(&concept.context, tc))
                    .flatten()
                    .collect();
                if expanded.is_empty() {
                    return Err(FeasibilityError::ContextualConceptNotExpandable(
                        concept.to_string(),
                    ));
                }
                Ok(expanded)
            }
        }
    }
}
