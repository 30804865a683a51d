//! Id sets and cohorts
//!
//! An [`IdSet`] is a finite set of non-negative record identifiers treated as
//! a unit for membership filtering. Identity for staging purposes is by
//! content, never by reference.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// An immutable set of record identifiers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdSet {
    members: BTreeSet<u32>,
}

impl IdSet {
    /// Create an empty id set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the set has no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether the given id is a member
    pub fn contains(&self, id: u32) -> bool {
        self.members.contains(&id)
    }

    /// Iterate members in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.members.iter().copied()
    }
}

impl FromIterator<u32> for IdSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

impl From<&[u32]> for IdSet {
    fn from(ids: &[u32]) -> Self {
        ids.iter().copied().collect()
    }
}

impl<const N: usize> From<[u32; N]> for IdSet {
    fn from(ids: [u32; N]) -> Self {
        ids.into_iter().collect()
    }
}

/// A named, persisted patient population, consumed only as a source of identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cohort {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    members: IdSet,
}

impl Cohort {
    /// Create a cohort with the given name and members
    pub fn new(name: impl Into<String>, members: IdSet) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            members,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The member ids of this cohort
    pub fn member_ids(&self) -> &IdSet {
        &self.members
    }
}
