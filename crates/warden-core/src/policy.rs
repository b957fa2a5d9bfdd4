//! Policy revisions as emitted by the policy list revision issuer.
//!
//! Matching a policy against an entity is exact here: a policy names one
//! server or one user.

use crate::ids::PolicyId;
use serde::{Deserialize, Serialize};

/// The kind of entity a policy targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PolicyKind {
    Server,
    User,
}

/// What the policy asks the bot to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Recommendation {
    Ban,
    /// Anything the intent nodes do not act on.
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub kind: PolicyKind,
    pub entity: String,
    pub recommendation: Recommendation,
    pub reason: Option<String>,
}

impl Policy {
    pub fn ban(id: impl Into<PolicyId>, kind: PolicyKind, entity: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            entity: entity.into(),
            recommendation: Recommendation::Ban,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// True when this policy bans an entity of `kind`.
    pub fn bans(&self, kind: PolicyKind) -> bool {
        self.kind == kind && self.recommendation == Recommendation::Ban
    }
}

impl From<String> for PolicyId {
    fn from(id: String) -> Self {
        PolicyId(id)
    }
}

/// Change between two policy list revisions.
///
/// A modified policy appears in both lists; removals are processed first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRevisionDelta {
    pub added: Vec<Policy>,
    pub removed: Vec<Policy>,
}

impl PolicyRevisionDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adding(policies: impl IntoIterator<Item = Policy>) -> Self {
        Self {
            added: policies.into_iter().collect(),
            removed: Vec::new(),
        }
    }

    pub fn removing(policies: impl IntoIterator<Item = Policy>) -> Self {
        Self {
            added: Vec::new(),
            removed: policies.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// One binding between an entity and a policy that bans it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyBinding {
    Bound { entity: String, policy: PolicyId },
    Unbound { entity: String, policy: PolicyId },
}
