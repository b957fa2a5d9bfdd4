//! Server ban intent - which servers must be denied by room ACLs
//!
//! Every server maps to the set of policies currently banning it. The
//! intent is the set of servers with at least one such policy, so two
//! overlapping policies can be removed one at a time without the server
//! flickering out of the intent.

use crate::ids::PolicyId;
use crate::node::ProjectionNode;
use crate::policy::{PolicyBinding, PolicyKind, PolicyRevisionDelta};
use crate::set_delta::SetDelta;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerBanIntentNode {
    denied: BTreeMap<String, BTreeSet<PolicyId>>,
}

/// Delta of [`ServerBanIntentNode`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerBanIntentDelta {
    /// Binding changes, applied in order.
    pub bindings: Vec<PolicyBinding>,
    /// Resulting change to the denied server set.
    pub intent: SetDelta<String>,
}

impl ServerBanIntentDelta {
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn append(&mut self, later: ServerBanIntentDelta) {
        self.intent.compose(&later.intent);
        self.bindings.extend(later.bindings);
    }
}

impl ServerBanIntentNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Servers that must be denied, in sorted order.
    pub fn denied_servers(&self) -> impl Iterator<Item = &String> {
        self.denied.keys()
    }

    pub fn is_denied(&self, server: &str) -> bool {
        self.denied.contains_key(server)
    }

    /// Policies currently banning `server`.
    pub fn policies_for(&self, server: &str) -> Option<&BTreeSet<PolicyId>> {
        self.denied.get(server)
    }

    pub fn len(&self) -> usize {
        self.denied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.denied.is_empty()
    }
}

impl ProjectionNode for ServerBanIntentNode {
    type Input = PolicyRevisionDelta;
    type Delta = ServerBanIntentDelta;

    fn reduce_initial_inputs(&self, inputs: &[PolicyRevisionDelta]) -> ServerBanIntentDelta {
        let mut scratch = self.clone();
        let mut combined = ServerBanIntentDelta::default();
        for input in inputs {
            let delta = scratch.reduce_input(input);
            scratch = scratch.reduce_delta(&delta);
            combined.append(delta);
        }
        combined
    }

    fn reduce_input(&self, input: &PolicyRevisionDelta) -> ServerBanIntentDelta {
        // Only servers touched by this revision are copied.
        let mut touched: BTreeMap<&str, BTreeSet<PolicyId>> = BTreeMap::new();
        let mut bindings = Vec::new();

        for policy in input.removed.iter().filter(|p| p.bans(PolicyKind::Server)) {
            let policies = touched
                .entry(policy.entity.as_str())
                .or_insert_with(|| self.denied.get(&policy.entity).cloned().unwrap_or_default());
            if policies.remove(&policy.id) {
                bindings.push(PolicyBinding::Unbound {
                    entity: policy.entity.clone(),
                    policy: policy.id.clone(),
                });
            }
        }

        for policy in input.added.iter().filter(|p| p.bans(PolicyKind::Server)) {
            let policies = touched
                .entry(policy.entity.as_str())
                .or_insert_with(|| self.denied.get(&policy.entity).cloned().unwrap_or_default());
            if policies.insert(policy.id.clone()) {
                bindings.push(PolicyBinding::Bound {
                    entity: policy.entity.clone(),
                    policy: policy.id.clone(),
                });
            }
        }

        let mut intent = SetDelta::new();
        for (server, policies) in touched {
            let was_denied = self.denied.contains_key(server);
            match (was_denied, policies.is_empty()) {
                (false, false) => intent.add(server.to_string()),
                (true, true) => intent.remove(server.to_string()),
                _ => {}
            }
        }

        ServerBanIntentDelta { bindings, intent }
    }

    fn reduce_delta(&self, delta: &ServerBanIntentDelta) -> Self {
        let mut next = self.clone();
        for binding in &delta.bindings {
            match binding {
                PolicyBinding::Bound { entity, policy } => {
                    next.denied
                        .entry(entity.clone())
                        .or_default()
                        .insert(policy.clone());
                }
                PolicyBinding::Unbound { entity, policy } => {
                    if let Some(policies) = next.denied.get_mut(entity) {
                        policies.remove(policy);
                        if policies.is_empty() {
                            next.denied.remove(entity);
                        }
                    }
                }
            }
        }
        next
    }
}
