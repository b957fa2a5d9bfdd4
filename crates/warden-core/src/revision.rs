//! Monotonic revision identifiers.
//!
//! Identifiers only need to sort in the order they were issued. A ULID
//! generator gives that while staying externally sortable as a string.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::{Generator, Ulid};

/// Identifier of one committed revision of a projection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionId(Ulid);

impl RevisionId {
    pub fn ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues strictly increasing [`RevisionId`]s.
pub struct RevisionClock {
    generator: Generator,
    last: Option<Ulid>,
}

impl RevisionClock {
    pub fn new() -> Self {
        Self {
            generator: Generator::new(),
            last: None,
        }
    }

    /// Issue the next identifier.
    pub fn tick(&mut self) -> RevisionId {
        let next = match self.generator.generate() {
            Ok(ulid) => ulid,
            // Random component exhausted within one millisecond.
            Err(_) => match self.last {
                Some(last) => last.increment().unwrap_or_else(Ulid::new),
                None => Ulid::new(),
            },
        };
        self.last = Some(next);
        RevisionId(next)
    }

    /// The most recently issued identifier.
    pub fn last(&self) -> Option<RevisionId> {
        self.last.map(RevisionId)
    }
}

impl Default for RevisionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RevisionClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevisionClock")
            .field("last", &self.last)
            .finish()
    }
}
