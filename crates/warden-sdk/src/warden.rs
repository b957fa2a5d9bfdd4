//! High-level entry point wiring revisions, projections and protections.

use crate::acl::ServerAclCapability;
use crate::config::ReconcileConfig;
use crate::error::Result;
use crate::gateway::{MemoryGateway, RoomStateGateway};
use crate::protection::{RoomBanProcessor, ServerBanSynchronisation, UserBanSynchronisation};
use crate::registry::{CapabilityRegistry, ProtectionRegistry};
use crate::revision::{MembershipRevision, PolicyListRevision};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;
use warden_core::membership::MembershipRevisionDelta;
use warden_core::policy::PolicyRevisionDelta;
use warden_core::server_ban::ServerBanIntentNode;
use warden_core::user_ban::{BanIntentInput, UserBanIntentNode};
use warden_core::RoomId;
use warden_projection::{Projection, RevisionIssuer};
use warden_sched::{CheckHandle, TaskFailureReporter, TracingReporter};

/// A moderation bot's reconciliation core.
///
/// Policy and membership revisions are issued into in-memory revision
/// sources; the server ban and user ban projections follow them, and the
/// registered protections push the resulting intent into rooms through the
/// gateway.
///
/// # Example
///
/// ```rust
/// use warden_core::policy::{Policy, PolicyKind, PolicyRevisionDelta};
/// use warden_sdk::{ReconcileConfig, Warden};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let warden = Warden::new_with_memory_gateway(ReconcileConfig::default()).unwrap();
///     warden.issue_policies(PolicyRevisionDelta::adding([
///         Policy::ban("p1", PolicyKind::Server, "evil.example"),
///     ]));
///     assert!(warden.server_ban_intent().is_denied("evil.example"));
///     warden.shutdown();
/// }
/// ```
pub struct Warden<G: RoomStateGateway> {
    config: ReconcileConfig,
    gateway: Arc<G>,
    issue_lock: Mutex<()>,
    policies: Arc<RevisionIssuer<PolicyListRevision, PolicyRevisionDelta>>,
    membership: Arc<RevisionIssuer<MembershipRevision, MembershipRevisionDelta>>,
    server_bans: Arc<Projection<ServerBanIntentNode>>,
    user_bans: Arc<Projection<UserBanIntentNode>>,
    server_ban_sync: Arc<ServerBanSynchronisation>,
    user_ban_sync: Arc<UserBanSynchronisation>,
    capabilities: CapabilityRegistry,
    protections: ProtectionRegistry,
}

impl Warden<MemoryGateway> {
    /// Create a warden over an in-memory gateway (for testing).
    pub fn new_with_memory_gateway(config: ReconcileConfig) -> Result<Self> {
        Self::new(Arc::new(MemoryGateway::new()), config, Arc::new(TracingReporter))
    }
}

impl<G: RoomStateGateway> Warden<G> {
    pub fn new(gateway: Arc<G>, config: ReconcileConfig, reporter: Arc<dyn TaskFailureReporter>) -> Result<Self> {
        let policies = Arc::new(RevisionIssuer::new(PolicyListRevision::new()));
        let membership = Arc::new(RevisionIssuer::new(MembershipRevision::new()));

        let server_bans = Projection::new(ServerBanIntentNode::new());
        server_bans.attach_source(&policies, |_revision: &PolicyListRevision, delta: &PolicyRevisionDelta| {
            delta.clone()
        })?;

        let user_bans = Projection::new(UserBanIntentNode::new());
        user_bans.attach_source(&policies, |_revision: &PolicyListRevision, delta: &PolicyRevisionDelta| {
            BanIntentInput::from(delta.clone())
        })?;
        user_bans.attach_source(&membership, |_revision: &MembershipRevision, delta: &MembershipRevisionDelta| {
            BanIntentInput::from(delta.clone())
        })?;

        let room_gateway: Arc<dyn RoomStateGateway> = gateway.clone();
        let acl_capability = Arc::new(ServerAclCapability::new(Arc::clone(&room_gateway), config.clone()));
        let ban_processor = Arc::new(RoomBanProcessor::new(room_gateway));

        let capabilities = CapabilityRegistry::new();
        capabilities.register(acl_capability.clone())?;
        capabilities.register(ban_processor.clone())?;

        let server_ban_sync = Arc::new(ServerBanSynchronisation::new(
            &server_bans,
            acl_capability,
            &config,
            Arc::clone(&reporter),
        ));
        let user_ban_sync = Arc::new(UserBanSynchronisation::new(&user_bans, ban_processor, reporter));

        let protections = ProtectionRegistry::new();
        protections.register(server_ban_sync.clone())?;
        protections.register(user_ban_sync.clone())?;

        info!(
            capabilities = capabilities.len(),
            protections = protections.len(),
            "warden started"
        );

        Ok(Self {
            config,
            gateway,
            issue_lock: Mutex::new(()),
            policies,
            membership,
            server_bans,
            user_bans,
            server_ban_sync,
            user_ban_sync,
            capabilities,
            protections,
        })
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// Issue the next policy list revision.
    pub fn issue_policies(&self, delta: PolicyRevisionDelta) {
        let _issuing = self.issue_lock.lock();
        let next = self.policies.current_revision().apply(&delta);
        self.policies.issue(next, delta);
    }

    /// Issue the next membership revision.
    pub fn issue_membership(&self, delta: MembershipRevisionDelta) {
        let _issuing = self.issue_lock.lock();
        let next = self.membership.current_revision().apply(&delta);
        self.membership.issue(next, delta);
    }

    pub fn policy_revision(&self) -> Arc<PolicyListRevision> {
        self.policies.current_revision()
    }

    pub fn membership_revision(&self) -> Arc<MembershipRevision> {
        self.membership.current_revision()
    }

    /// Start protecting `room`; its ACL is brought up to date by the next
    /// rate-limited resync and members already targeted by a user ban are
    /// banned.
    pub fn protect_room(&self, room: impl Into<RoomId>) -> bool {
        let room = room.into();
        let acl = self.server_ban_sync.add_protected_room(room.clone());
        let bans = self.user_ban_sync.add_protected_room(room);
        acl || bans
    }

    pub fn unprotect_room(&self, room: &RoomId) -> bool {
        let acl = self.server_ban_sync.remove_protected_room(room);
        let bans = self.user_ban_sync.remove_protected_room(room);
        acl || bans
    }

    /// Check one room's ACL now, bypassing the resync gate.
    pub fn check_room_acl(&self, room: RoomId) -> CheckHandle {
        self.server_ban_sync.check_room(room)
    }

    pub fn server_ban_intent(&self) -> Arc<ServerBanIntentNode> {
        self.server_bans.current()
    }

    pub fn user_ban_intent(&self) -> Arc<UserBanIntentNode> {
        self.user_bans.current()
    }

    pub fn server_ban_sync(&self) -> &Arc<ServerBanSynchronisation> {
        &self.server_ban_sync
    }

    pub fn user_ban_sync(&self) -> &Arc<UserBanSynchronisation> {
        &self.user_ban_sync
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    pub fn protections(&self) -> &ProtectionRegistry {
        &self.protections
    }

    /// Dispose every protection, then both projections.
    pub fn shutdown(&self) {
        self.protections.dispose_all();
        self.server_bans.dispose();
        self.user_bans.dispose();
        info!("warden shut down");
    }
}
