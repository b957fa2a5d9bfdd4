//! Upstream revisions issued to the projections.

use std::collections::{BTreeMap, BTreeSet};
use warden_core::membership::{MembershipChange, MembershipRevisionDelta};
use warden_core::policy::{Policy, PolicyRevisionDelta};
use warden_core::{PolicyId, RoomId, UserId};

/// Snapshot of every policy on the watched lists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyListRevision {
    policies: BTreeMap<PolicyId, Policy>,
}

impl PolicyListRevision {
    pub fn new() -> Self {
        Self::default()
    }

    /// The revision after `delta`. Removals apply before additions.
    pub fn apply(&self, delta: &PolicyRevisionDelta) -> Self {
        let mut policies = self.policies.clone();
        for policy in &delta.removed {
            policies.remove(&policy.id);
        }
        for policy in &delta.added {
            policies.insert(policy.id.clone(), policy.clone());
        }
        Self { policies }
    }

    pub fn get(&self, id: &PolicyId) -> Option<&Policy> {
        self.policies.get(id)
    }

    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Snapshot of the members of every protected room.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MembershipRevision {
    rooms: BTreeMap<RoomId, BTreeSet<UserId>>,
}

impl MembershipRevision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, delta: &MembershipRevisionDelta) -> Self {
        let mut rooms = self.rooms.clone();
        for change in &delta.changes {
            match change {
                MembershipChange::Joined { room, user } => {
                    rooms.entry(room.clone()).or_default().insert(user.clone());
                }
                MembershipChange::Left { room, user } => {
                    if let Some(members) = rooms.get_mut(room) {
                        members.remove(user);
                    }
                }
            }
        }
        Self { rooms }
    }

    pub fn members(&self, room: &RoomId) -> impl Iterator<Item = &UserId> {
        self.rooms.get(room).into_iter().flatten()
    }

    pub fn is_member(&self, room: &RoomId, user: &UserId) -> bool {
        self.rooms.get(room).map_or(false, |members| members.contains(user))
    }
}
