//! Server ACL reconciliation.
//!
//! ```text
//! enqueue(room, intent) ─► PerKeyCoalescingCheck
//!                              │
//!                              ▼
//!        desired  = compile(intent, config)
//!        observed = gateway.server_acl(room)
//!        observed ≡ desired ? Ok(false) : send(desired), Ok(true)
//! ```
//!
//! Equivalence ignores ordering and duplicates in the allow and deny lists,
//! so an ACL written by another client in a different order is left alone.

use crate::config::ReconcileConfig;
use crate::gateway::RoomStateGateway;
use crate::registry::{CapabilityProvider, Describe};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use warden_core::server_ban::ServerBanIntentNode;
use warden_core::RoomId;
use warden_sched::{ActionResult, Capability, CheckHandle, PerKeyCoalescingCheck, TaskFailureReporter};

/// Content of a room's server ACL state event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAcl {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub allow_ip_literals: bool,
}

impl ServerAcl {
    pub fn new(
        allow: impl IntoIterator<Item = impl Into<String>>,
        deny: impl IntoIterator<Item = impl Into<String>>,
        allow_ip_literals: bool,
    ) -> Self {
        Self {
            allow: allow.into_iter().map(Into::into).collect(),
            deny: deny.into_iter().map(Into::into).collect(),
            allow_ip_literals,
        }
    }

    /// The ACL a room should carry for `intent`.
    pub fn compile(intent: &ServerBanIntentNode, config: &ReconcileConfig) -> Self {
        Self {
            allow: config.acl_allow.clone(),
            deny: intent.denied_servers().cloned().collect(),
            allow_ip_literals: config.allow_ip_literals,
        }
    }

    pub fn is_equivalent(&self, other: &ServerAcl) -> bool {
        fn entries(list: &[String]) -> BTreeSet<&str> {
            list.iter().map(String::as_str).collect()
        }
        self.allow_ip_literals == other.allow_ip_literals
            && entries(&self.allow) == entries(&other.allow)
            && entries(&self.deny) == entries(&other.deny)
    }
}

/// Brings one room's ACL in line with the server ban intent.
pub struct ServerAclCapability {
    gateway: Arc<dyn RoomStateGateway>,
    config: ReconcileConfig,
}

impl ServerAclCapability {
    pub fn new(gateway: Arc<dyn RoomStateGateway>, config: ReconcileConfig) -> Self {
        Self { gateway, config }
    }
}

impl Describe for ServerAclCapability {
    fn name(&self) -> &str {
        "ServerACLSynchronisationCapability"
    }

    fn description(&self) -> &str {
        "Compiles the server ban intent into m.room.server_acl and sends it when the room differs"
    }
}

impl CapabilityProvider for ServerAclCapability {
    fn interface(&self) -> &str {
        "ServerACLConsequences"
    }
}

#[async_trait]
impl Capability<RoomId, Arc<ServerBanIntentNode>> for ServerAclCapability {
    async fn apply(&self, room: &RoomId, intent: &Arc<ServerBanIntentNode>) -> ActionResult<bool> {
        let desired = ServerAcl::compile(intent, &self.config);
        let observed = self.gateway.server_acl(room).await?;
        if observed.map_or(false, |acl| acl.is_equivalent(&desired)) {
            debug!(%room, "server ACL already up to date");
            return Ok(false);
        }
        self.gateway.send_server_acl(room, &desired).await?;
        debug!(%room, denied = desired.deny.len(), "server ACL updated");
        Ok(true)
    }
}

/// Per-room coalescing of ACL checks.
pub struct ServerAclQueue {
    check: PerKeyCoalescingCheck<RoomId, Arc<ServerBanIntentNode>>,
}

impl ServerAclQueue {
    pub fn new(capability: Arc<ServerAclCapability>, reporter: Arc<dyn TaskFailureReporter>) -> Self {
        Self {
            check: PerKeyCoalescingCheck::new(capability, reporter),
        }
    }

    /// Check `room` against `intent`. The returned handle resolves to
    /// whether the room's ACL was changed.
    pub fn enqueue(&self, room: RoomId, intent: Arc<ServerBanIntentNode>) -> CheckHandle {
        self.check.enqueue_check(room, intent)
    }

    pub fn is_checking(&self, room: &RoomId) -> bool {
        self.check.is_active(room)
    }

    pub fn tracked_rooms(&self) -> usize {
        self.check.tracked_keys()
    }
}
