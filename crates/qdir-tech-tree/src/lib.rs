//! Tech-requirement table for qdir games.
//!
//! A [`TechTree`] maps entry names to the names they require. The scheduler
//! never looks inside it; games use it to decide what may be produced next
//! and typically wrap [`TechTree::is_unlockable`] in a lock predicate.
//!
//! # Queries
//!
//! All queries are pure and return names sorted ascending.
//!
//! - [`TechTree::unlockable`]: entries whose requirements are all available.
//! - [`TechTree::produce_options`]: `unlockable` of one name plus extras.
//! - [`TechTree::required_by`]: entries whose requirement list contains the
//!   name and every extra.
//! - [`TechTree::newly_unlocked`]: entries that only become unlockable once a
//!   name is added to what is available.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One named entry and the names it requires. An entry may require itself,
/// meaning it needs an existing copy before another can be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechEntry {
    pub name: String,
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl TechEntry {
    pub fn new(name: impl Into<String>, requirements: &[&str]) -> Self {
        Self {
            name: name.into(),
            requirements: requirements.iter().map(|r| r.to_string()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TechTreeError {
    #[error("duplicate tech entry: {0}")]
    DuplicateName(String),

    #[error("requirement {requirement:?} of entry {entry:?} does not exist")]
    UnknownRequirement { entry: String, requirement: String },
}

// ---------------------------------------------------------------------------
// TechTree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechTree {
    /// Requirements keyed by entry name.
    entries: BTreeMap<String, Vec<String>>,
}

impl TechTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a list of entries and check that every requirement
    /// names an entry of the tree.
    pub fn from_entries(entries: impl IntoIterator<Item = TechEntry>) -> Result<Self, TechTreeError> {
        let mut tree = Self::new();
        for entry in entries {
            tree.register(entry)?;
        }
        tree.validate()?;
        Ok(tree)
    }

    /// Add an entry. Requirements are not checked here, so entries may be
    /// added in any order; call [`TechTree::validate`] once all are in.
    pub fn register(&mut self, entry: TechEntry) -> Result<(), TechTreeError> {
        if self.entries.contains_key(&entry.name) {
            return Err(TechTreeError::DuplicateName(entry.name));
        }
        self.entries.insert(entry.name, entry.requirements);
        Ok(())
    }

    /// Check that every requirement names a registered entry.
    pub fn validate(&self) -> Result<(), TechTreeError> {
        for (name, requirements) in &self.entries {
            if let Some(missing) = requirements.iter().find(|r| !self.entries.contains_key(*r)) {
                return Err(TechTreeError::UnknownRequirement {
                    entry: name.clone(),
                    requirement: missing.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn requirements(&self, name: &str) -> Option<&[String]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Entry names, ascending.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Back to a list of entries, ascending by name.
    pub fn entries(&self) -> Vec<TechEntry> {
        self.entries
            .iter()
            .map(|(name, requirements)| TechEntry {
                name: name.clone(),
                requirements: requirements.clone(),
            })
            .collect()
    }

    // -- Queries --

    /// Whether `name` is an entry whose requirements are all in `available`.
    pub fn is_unlockable(&self, name: &str, available: &[&str]) -> bool {
        self.entries
            .get(name)
            .is_some_and(|requirements| satisfied(requirements, &to_set(available)))
    }

    /// Every entry whose requirements are all in `available`.
    pub fn unlockable(&self, available: &[&str]) -> Vec<&str> {
        let available = to_set(available);
        self.entries
            .iter()
            .filter(|(_, requirements)| satisfied(requirements, &available))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Every entry whose requirements are all satisfied by `name` together
    /// with `extras`.
    pub fn produce_options(&self, name: &str, extras: &[&str]) -> Vec<&str> {
        let mut available = extras.to_vec();
        available.push(name);
        self.unlockable(&available)
    }

    /// Every entry whose requirement list contains `name` and all of
    /// `extras`.
    pub fn required_by(&self, name: &str, extras: &[&str]) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, requirements)| {
                std::iter::once(name)
                    .chain(extras.iter().copied())
                    .all(|needed| requirements.iter().any(|r| r == needed))
            })
            .map(|(entry, _)| entry.as_str())
            .collect()
    }

    /// Entries that become unlockable only once `name` joins `available`.
    pub fn newly_unlocked(&self, name: &str, available: &[&str]) -> Vec<&str> {
        let before: BTreeSet<&str> = self.unlockable(available).into_iter().collect();
        self.produce_options(name, available)
            .into_iter()
            .filter(|entry| !before.contains(entry))
            .collect()
    }
}

fn to_set<'a>(names: &[&'a str]) -> BTreeSet<&'a str> {
    names.iter().copied().collect()
}

fn satisfied(requirements: &[String], available: &BTreeSet<&str>) -> bool {
    requirements.iter().all(|r| available.contains(r.as_str()))
}

// ===========================================================================
// Tests
// ===========================================================================
