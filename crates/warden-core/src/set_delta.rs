//! Set delta - the change between two revisions of a set-valued intent
//!
//! A well-formed delta relative to a base set `B` keeps `added ∩ B = ∅` and
//! `removed ⊆ B`. Composing two well-formed deltas yields a well-formed delta.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDelta<T: Ord + Clone> {
    pub added: BTreeSet<T>,
    pub removed: BTreeSet<T>,
}

impl<T: Ord + Clone> SetDelta<T> {
    pub fn new() -> Self {
        Self {
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Record that `value` entered the set.
    pub fn add(&mut self, value: T) {
        if !self.removed.remove(&value) {
            self.added.insert(value);
        }
    }

    /// Record that `value` left the set.
    pub fn remove(&mut self, value: T) {
        if !self.added.remove(&value) {
            self.removed.insert(value);
        }
    }

    /// Fold a later delta into this one.
    pub fn compose(&mut self, later: &SetDelta<T>) {
        for value in &later.added {
            self.add(value.clone());
        }
        for value in &later.removed {
            self.remove(value.clone());
        }
    }

    /// Apply to a concrete set.
    pub fn apply_to(&self, set: &mut BTreeSet<T>) {
        for value in &self.removed {
            set.remove(value);
        }
        for value in &self.added {
            set.insert(value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl<T: Ord + Clone> Default for SetDelta<T> {
    fn default() -> Self {
        Self::new()
    }
}
