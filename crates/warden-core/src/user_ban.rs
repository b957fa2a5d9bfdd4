//! User ban intent - which members must be banned from which rooms
//!
//! A multi-input node: policy revisions decide which users are banned,
//! membership revisions decide where they are. The intent per room is the
//! set of current members that at least one user ban policy targets.

use crate::ids::{PolicyId, RoomId, UserId};
use crate::membership::{MembershipChange, MembershipRevisionDelta};
use crate::node::ProjectionNode;
use crate::policy::{PolicyBinding, PolicyKind, PolicyRevisionDelta};
use crate::set_delta::SetDelta;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Upstream input for [`UserBanIntentNode`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BanIntentInput {
    Policy(PolicyRevisionDelta),
    Membership(MembershipRevisionDelta),
}

impl From<PolicyRevisionDelta> for BanIntentInput {
    fn from(delta: PolicyRevisionDelta) -> Self {
        BanIntentInput::Policy(delta)
    }
}

impl From<MembershipRevisionDelta> for BanIntentInput {
    fn from(delta: MembershipRevisionDelta) -> Self {
        BanIntentInput::Membership(delta)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBanIntentNode {
    bans: BTreeMap<UserId, BTreeSet<PolicyId>>,
    members: BTreeMap<RoomId, BTreeSet<UserId>>,
}

/// Delta of [`UserBanIntentNode`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBanIntentDelta {
    pub bindings: Vec<PolicyBinding>,
    pub membership: Vec<MembershipChange>,
    /// Per room change to the set of users that must be banned.
    pub intent: BTreeMap<RoomId, SetDelta<UserId>>,
}

impl UserBanIntentDelta {
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.membership.is_empty()
    }

    fn append(&mut self, later: UserBanIntentDelta) {
        for (room, delta) in later.intent {
            self.intent.entry(room).or_default().compose(&delta);
        }
        self.intent.retain(|_, delta| !delta.is_empty());
        self.bindings.extend(later.bindings);
        self.membership.extend(later.membership);
    }
}

impl UserBanIntentNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_banned(&self, user: &UserId) -> bool {
        self.bans.contains_key(user)
    }

    pub fn is_member(&self, room: &RoomId, user: &UserId) -> bool {
        self.members
            .get(room)
            .map(|members| members.contains(user))
            .unwrap_or(false)
    }

    /// Members of `room` that must be banned.
    pub fn users_to_ban(&self, room: &RoomId) -> BTreeSet<UserId> {
        self.members
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .filter(|user| self.bans.contains_key(*user))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn rooms_of<'a>(&'a self, user: &'a UserId) -> impl Iterator<Item = &'a RoomId> + 'a {
        self.members
            .iter()
            .filter(move |(_, members)| members.contains(user))
            .map(|(room, _)| room)
    }

    fn reduce_policy(&self, input: &PolicyRevisionDelta) -> UserBanIntentDelta {
        let mut touched: BTreeMap<UserId, BTreeSet<PolicyId>> = BTreeMap::new();
        let mut bindings = Vec::new();

        for policy in input.removed.iter().filter(|p| p.bans(PolicyKind::User)) {
            let user = UserId::new(policy.entity.clone());
            let policies = touched
                .entry(user.clone())
                .or_insert_with(|| self.bans.get(&user).cloned().unwrap_or_default());
            if policies.remove(&policy.id) {
                bindings.push(PolicyBinding::Unbound {
                    entity: policy.entity.clone(),
                    policy: policy.id.clone(),
                });
            }
        }

        for policy in input.added.iter().filter(|p| p.bans(PolicyKind::User)) {
            let user = UserId::new(policy.entity.clone());
            let policies = touched
                .entry(user.clone())
                .or_insert_with(|| self.bans.get(&user).cloned().unwrap_or_default());
            if policies.insert(policy.id.clone()) {
                bindings.push(PolicyBinding::Bound {
                    entity: policy.entity.clone(),
                    policy: policy.id.clone(),
                });
            }
        }

        let mut intent: BTreeMap<RoomId, SetDelta<UserId>> = BTreeMap::new();
        for (user, policies) in &touched {
            let was_banned = self.bans.contains_key(user);
            let now_banned = !policies.is_empty();
            if was_banned == now_banned {
                continue;
            }
            for room in self.rooms_of(user) {
                let delta = intent.entry(room.clone()).or_default();
                if now_banned {
                    delta.add(user.clone());
                } else {
                    delta.remove(user.clone());
                }
            }
        }

        UserBanIntentDelta {
            bindings,
            membership: Vec::new(),
            intent,
        }
    }

    fn reduce_membership(&self, input: &MembershipRevisionDelta) -> UserBanIntentDelta {
        // (room, user) -> is member, seeded lazily from the current node.
        let mut touched: BTreeMap<(RoomId, UserId), bool> = BTreeMap::new();
        let mut membership = Vec::new();

        for change in &input.changes {
            let (room, user, joining) = match change {
                MembershipChange::Joined { room, user } => (room, user, true),
                MembershipChange::Left { room, user } => (room, user, false),
            };
            let is_member = touched
                .entry((room.clone(), user.clone()))
                .or_insert_with(|| self.is_member(room, user));
            if *is_member != joining {
                *is_member = joining;
                membership.push(change.clone());
            }
        }

        let mut intent: BTreeMap<RoomId, SetDelta<UserId>> = BTreeMap::new();
        for ((room, user), is_member) in touched {
            if !self.bans.contains_key(&user) || self.is_member(&room, &user) == is_member {
                continue;
            }
            let delta = intent.entry(room).or_default();
            if is_member {
                delta.add(user);
            } else {
                delta.remove(user);
            }
        }

        UserBanIntentDelta {
            bindings: Vec::new(),
            membership,
            intent,
        }
    }
}

impl ProjectionNode for UserBanIntentNode {
    type Input = BanIntentInput;
    type Delta = UserBanIntentDelta;

    fn reduce_initial_inputs(&self, inputs: &[BanIntentInput]) -> UserBanIntentDelta {
        let mut scratch = self.clone();
        let mut combined = UserBanIntentDelta::default();
        for input in inputs {
            let delta = scratch.reduce_input(input);
            scratch = scratch.reduce_delta(&delta);
            combined.append(delta);
        }
        combined
    }

    fn reduce_input(&self, input: &BanIntentInput) -> UserBanIntentDelta {
        match input {
            BanIntentInput::Policy(delta) => self.reduce_policy(delta),
            BanIntentInput::Membership(delta) => self.reduce_membership(delta),
        }
    }

    fn reduce_delta(&self, delta: &UserBanIntentDelta) -> Self {
        let mut next = self.clone();
        for binding in &delta.bindings {
            match binding {
                PolicyBinding::Bound { entity, policy } => {
                    next.bans
                        .entry(UserId::new(entity.clone()))
                        .or_default()
                        .insert(policy.clone());
                }
                PolicyBinding::Unbound { entity, policy } => {
                    let user = UserId::new(entity.clone());
                    if let Some(policies) = next.bans.get_mut(&user) {
                        policies.remove(policy);
                        if policies.is_empty() {
                            next.bans.remove(&user);
                        }
                    }
                }
            }
        }
        for change in &delta.membership {
            match change {
                MembershipChange::Joined { room, user } => {
                    next.members
                        .entry(room.clone())
                        .or_default()
                        .insert(user.clone());
                }
                MembershipChange::Left { room, user } => {
                    if let Some(members) = next.members.get_mut(room) {
                        members.remove(user);
                        if members.is_empty() {
                            next.members.remove(room);
                        }
                    }
                }
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;

    fn apply(node: &UserBanIntentNode, input: impl Into<BanIntentInput>) -> (UserBanIntentNode, UserBanIntentDelta) {
        let delta = node.reduce_input(&input.into());
        (node.reduce_delta(&delta), delta)
    }

    fn user_ban(id: &str, user: &str) -> Policy {
        Policy::ban(id, PolicyKind::User, user)
    }

    #[test]
    fn test_ban_of_present_member_enters_intent() {
        let room = RoomId::new("!room:example.org");
        let spammer = UserId::new("@spam:evil.example");

        let node = UserBanIntentNode::new();
        let (node, _) = apply(&node, MembershipRevisionDelta::new().join("!room:example.org", "@spam:evil.example"));
        let (node, delta) = apply(&node, PolicyRevisionDelta::adding([user_ban("p1", "@spam:evil.example")]));

        assert!(delta.intent[&room].added.contains(&spammer));
        assert_eq!(node.users_to_ban(&room), BTreeSet::from([spammer]));
    }

    #[test]
    fn test_banned_user_joining_enters_intent() {
        let room = RoomId::new("!room:example.org");
        let spammer = UserId::new("@spam:evil.example");

        let node = UserBanIntentNode::new();
        let (node, delta) = apply(&node, PolicyRevisionDelta::adding([user_ban("p1", "@spam:evil.example")]));
        assert!(delta.intent.is_empty(), "no rooms contain the user yet");

        let (node, delta) = apply(&node, MembershipRevisionDelta::new().join("!room:example.org", "@spam:evil.example"));
        assert!(delta.intent[&room].added.contains(&spammer));

        let (node, delta) = apply(&node, MembershipRevisionDelta::new().leave("!room:example.org", "@spam:evil.example"));
        assert!(delta.intent[&room].removed.contains(&spammer));
        assert!(node.users_to_ban(&room).is_empty());
    }

    #[test]
    fn test_join_then_leave_in_one_revision_nets_out() {
        let node = UserBanIntentNode::new();
        let (node, _) = apply(&node, PolicyRevisionDelta::adding([user_ban("p1", "@spam:evil.example")]));
        let churn = MembershipRevisionDelta::new()
            .join("!room:example.org", "@spam:evil.example")
            .leave("!room:example.org", "@spam:evil.example");
        let (next, delta) = apply(&node, churn);

        assert!(delta.intent.is_empty());
        assert_eq!(delta.membership.len(), 2);
        assert_eq!(next, node);
    }

    #[test]
    fn test_unban_clears_every_room() {
        let node = UserBanIntentNode::new();
        let (node, _) = apply(
            &node,
            MembershipRevisionDelta::new()
                .join("!a:example.org", "@spam:evil.example")
                .join("!b:example.org", "@spam:evil.example"),
        );
        let (node, _) = apply(&node, PolicyRevisionDelta::adding([user_ban("p1", "@spam:evil.example")]));
        let (node, delta) = apply(&node, PolicyRevisionDelta::removing([user_ban("p1", "@spam:evil.example")]));

        assert_eq!(delta.intent.len(), 2);
        assert!(delta.intent.values().all(|d| d.removed.len() == 1));
        assert!(!node.is_banned(&UserId::new("@spam:evil.example")));
    }
}
