//! Patient populations.
//!
//! A [`Population`] is an immutable set of patient ids. It is the unit of result
//! exchange between the search backend, the cache tiers and the set-algebra
//! orchestrator. Set operations always return new instances; the id set itself is
//! shared behind an [`Arc`] so cloning a population out of a cache is cheap.
//!
//! ## Binary format
//!
//! ```text
//! [version: u8 = 0] ( [length: u8] [ASCII bytes; length] )*
//! ```
//!
//! Ids are validated on construction (ASCII, 1..=64 bytes) so encoding never fails.

use std::collections::HashSet;
use std::mem::size_of;
use std::sync::Arc;

use crate::error::PopulationError;

/// Maximum length of a patient id in bytes.
pub const MAX_PATIENT_ID_LEN: usize = 64;

/// Current binary format version.
const FORMAT_VERSION: u8 = 0;

/// Rough per-entry overhead of a hash set slot (hash + control byte + padding).
const SLOT_OVERHEAD: usize = 16;

/// Immutable set of patient ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Population {
    ids: Arc<HashSet<String>>,
}

impl Population {
    /// The empty population.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a population from patient ids, validating each one.
    pub fn of<I, S>(ids: I) -> Result<Self, PopulationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                validate_patient_id(&id)?;
                Ok(id)
            })
            .collect::<Result<HashSet<_>, PopulationError>>()?;
        Ok(Self { ids: Arc::new(ids) })
    }

    fn from_set(ids: HashSet<String>) -> Self {
        Self { ids: Arc::new(ids) }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Ids in ascending order. Useful for stable output and assertions.
    pub fn sorted_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.iter().collect();
        ids.sort_unstable();
        ids
    }

    pub fn union(&self, other: &Population) -> Population {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let (large, small) = if self.len() >= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        let mut ids = (*large.ids).clone();
        ids.extend(small.ids.iter().cloned());
        Self::from_set(ids)
    }

    pub fn intersection(&self, other: &Population) -> Population {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        Self::from_set(
            small
                .ids
                .iter()
                .filter(|id| large.ids.contains(*id))
                .cloned()
                .collect(),
        )
    }

    pub fn difference(&self, other: &Population) -> Population {
        if other.is_empty() || self.is_empty() {
            return self.clone();
        }
        Self::from_set(
            self.ids
                .iter()
                .filter(|id| !other.ids.contains(*id))
                .cloned()
                .collect(),
        )
    }

    /// Approximate heap footprint in bytes. Used as the in-memory cache weight.
    pub fn memory_size(&self) -> usize {
        let entries: usize = self
            .ids
            .iter()
            .map(|id| size_of::<String>() + id.capacity() + SLOT_OVERHEAD)
            .sum();
        size_of::<Self>() + size_of::<HashSet<String>>() + entries
    }

    /// Encode into the compact binary format.
    pub fn encode(&self) -> Vec<u8> {
        let payload: usize = self.ids.iter().map(|id| id.len() + 1).sum();
        let mut buf = Vec::with_capacity(1 + payload);
        buf.push(FORMAT_VERSION);
        for id in self.ids.iter() {
            // Lengths are bounded by MAX_PATIENT_ID_LEN at construction.
            buf.push(id.len() as u8);
            buf.extend_from_slice(id.as_bytes());
        }
        buf
    }

    /// Decode from the compact binary format.
    pub fn decode(bytes: &[u8]) -> Result<Self, PopulationError> {
        let (&version, mut rest) = bytes.split_first().ok_or(PopulationError::EmptyBuffer)?;
        if version != FORMAT_VERSION {
            return Err(PopulationError::UnsupportedVersion(version));
        }

        let mut ids = HashSet::new();
        let mut offset = 1;
        while let Some((&len, tail)) = rest.split_first() {
            let len = len as usize;
            if tail.len() < len {
                return Err(PopulationError::Truncated(offset));
            }
            let (id_bytes, next) = tail.split_at(len);
            let id = String::from_utf8(id_bytes.to_vec()).map_err(|_| {
                PopulationError::InvalidPatientId {
                    id: String::from_utf8_lossy(id_bytes).into_owned(),
                    reason: "not ASCII",
                }
            })?;
            validate_patient_id(&id)?;
            ids.insert(id);
            offset += 1 + len;
            rest = next;
        }
        Ok(Self::from_set(ids))
    }
}

fn validate_patient_id(id: &str) -> Result<(), PopulationError> {
    let reason = if id.is_empty() {
        "empty"
    } else if id.len() > MAX_PATIENT_ID_LEN {
        "longer than 64 characters"
    } else if !id.is_ascii() {
        "not ASCII"
    } else {
        return Ok(());
    };
    Err(PopulationError::InvalidPatientId {
        id: id.to_string(),
        reason,
    })
}
