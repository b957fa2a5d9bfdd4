//! Protections - projection listeners that push intent into rooms.
//!
//! ```text
//! Projection<ServerBanIntentNode> ──listener──► ServerAclQueue ──► gateway.send_server_acl
//!        ▲                                          ▲
//!        │                      TimedGate resync ───┘ (protected room added)
//!
//! Projection<UserBanIntentNode> ──listener──► KeyedBatchQueue<RoomId, UserId> ──► gateway.ban_users
//! ```
//!
//! Listeners only enqueue; every effect runs on the schedulers' own tasks,
//! so they must be registered from within a tokio runtime.

use crate::acl::{ServerAclCapability, ServerAclQueue};
use crate::config::ReconcileConfig;
use crate::gateway::RoomStateGateway;
use crate::registry::{CapabilityProvider, Describe, Protection};
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use warden_core::server_ban::ServerBanIntentNode;
use warden_core::user_ban::UserBanIntentNode;
use warden_core::{RoomId, UserId};
use warden_projection::{ListenerId, Projection};
use warden_sched::{
    ActionResult, BatchProcessor, CheckHandle, KeyedBatchQueue, TaskFailureReporter, TimedGate,
};

/// Keeps every protected room's server ACL in line with the server ban
/// intent.
pub struct ServerBanSynchronisation {
    shared: Arc<ServerBanShared>,
    projection: Arc<Projection<ServerBanIntentNode>>,
    listener: ListenerId,
    gate: TimedGate,
    disposed: AtomicBool,
}

struct ServerBanShared {
    queue: ServerAclQueue,
    rooms: RwLock<BTreeSet<RoomId>>,
    projection: Weak<Projection<ServerBanIntentNode>>,
}

impl ServerBanShared {
    fn enqueue_all(&self, intent: &Arc<ServerBanIntentNode>) -> Vec<CheckHandle> {
        let rooms: Vec<RoomId> = self.rooms.read().iter().cloned().collect();
        rooms
            .into_iter()
            .map(|room| self.queue.enqueue(room, Arc::clone(intent)))
            .collect()
    }

    async fn resync(&self) -> ActionResult<()> {
        let Some(projection) = self.projection.upgrade() else {
            return Ok(());
        };
        let outcomes = join_all(self.enqueue_all(&projection.current())).await;
        let changed = outcomes.iter().filter(|outcome| matches!(outcome, Ok(true))).count();
        let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        info!(rooms = outcomes.len(), changed, failed, "server ACL resync finished");
        Ok(())
    }
}

impl ServerBanSynchronisation {
    pub fn new(
        projection: &Arc<Projection<ServerBanIntentNode>>,
        capability: Arc<ServerAclCapability>,
        config: &ReconcileConfig,
        reporter: Arc<dyn TaskFailureReporter>,
    ) -> Self {
        let shared = Arc::new(ServerBanShared {
            queue: ServerAclQueue::new(capability, Arc::clone(&reporter)),
            rooms: RwLock::new(BTreeSet::new()),
            projection: Arc::downgrade(projection),
        });

        let listening = Arc::clone(&shared);
        let listener = projection.add_node_listener(move |next, delta, _previous| {
            if delta.intent.is_empty() {
                return;
            }
            debug!(
                added = delta.intent.added.len(),
                removed = delta.intent.removed.len(),
                "denied servers changed"
            );
            listening.enqueue_all(next);
        });

        let resyncing = Arc::clone(&shared);
        let gate = TimedGate::new(
            config.acl_resync_delay(),
            move || {
                let shared = Arc::clone(&resyncing);
                async move { shared.resync().await }
            },
            reporter,
        );

        Self {
            shared,
            projection: Arc::clone(projection),
            listener,
            gate,
            disposed: AtomicBool::new(false),
        }
    }

    /// Start protecting `room`. Schedules a rate-limited resync of every
    /// protected room; returns false when the room was already protected.
    pub fn add_protected_room(&self, room: RoomId) -> bool {
        if self.is_disposed() {
            return false;
        }
        let added = self.shared.rooms.write().insert(room);
        if added {
            self.gate.enqueue_open();
        }
        added
    }

    pub fn remove_protected_room(&self, room: &RoomId) -> bool {
        self.shared.rooms.write().remove(room)
    }

    pub fn protected_rooms(&self) -> Vec<RoomId> {
        self.shared.rooms.read().iter().cloned().collect()
    }

    /// Request a rate-limited resync of every protected room.
    pub fn resync(&self) {
        self.gate.enqueue_open();
    }

    /// Check one room against the current intent right away.
    pub fn check_room(&self, room: RoomId) -> CheckHandle {
        self.shared.queue.enqueue(room, self.projection.current())
    }

    pub fn queue(&self) -> &ServerAclQueue {
        &self.shared.queue
    }
}

impl Describe for ServerBanSynchronisation {
    fn name(&self) -> &str {
        "ServerBanSynchronisationProtection"
    }

    fn description(&self) -> &str {
        "Maintains server ACLs in protected rooms from server ban policies"
    }
}

impl Protection for ServerBanSynchronisation {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.projection.remove_node_listener(self.listener);
        self.gate.destroy();
        debug!("server ban synchronisation disposed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for ServerBanSynchronisation {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Bans users through the room state gateway, one call per batch.
pub struct RoomBanProcessor {
    gateway: Arc<dyn RoomStateGateway>,
}

impl RoomBanProcessor {
    pub fn new(gateway: Arc<dyn RoomStateGateway>) -> Self {
        Self { gateway }
    }
}

impl Describe for RoomBanProcessor {
    fn name(&self) -> &str {
        "StandardUserConsequences"
    }

    fn description(&self) -> &str {
        "Bans users from rooms in deduplicated batches"
    }
}

impl CapabilityProvider for RoomBanProcessor {
    fn interface(&self) -> &str {
        "UserConsequences"
    }
}

#[async_trait]
impl BatchProcessor<RoomId, UserId> for RoomBanProcessor {
    async fn process(&self, room: &RoomId, users: Vec<UserId>) -> ActionResult<()> {
        self.gateway.ban_users(room, &users).await?;
        debug!(%room, users = users.len(), "users banned");
        Ok(())
    }
}

/// Bans members that a user ban policy targets, in every protected room
/// they are in.
pub struct UserBanSynchronisation {
    queue: Arc<KeyedBatchQueue<RoomId, UserId>>,
    rooms: Arc<RwLock<BTreeSet<RoomId>>>,
    projection: Arc<Projection<UserBanIntentNode>>,
    listener: ListenerId,
    disposed: AtomicBool,
}

impl UserBanSynchronisation {
    pub fn new(
        projection: &Arc<Projection<UserBanIntentNode>>,
        processor: Arc<RoomBanProcessor>,
        reporter: Arc<dyn TaskFailureReporter>,
    ) -> Self {
        let queue = Arc::new(KeyedBatchQueue::new(processor, reporter));
        let rooms = Arc::new(RwLock::new(BTreeSet::new()));

        let listening = Arc::clone(&queue);
        let protected = Arc::clone(&rooms);
        let listener = projection.add_node_listener(move |_next, delta, _previous| {
            let protected = protected.read();
            for (room, change) in &delta.intent {
                if !protected.contains(room) {
                    continue;
                }
                for user in &change.added {
                    // Outcomes are reported by the queue.
                    drop(listening.enqueue(room.clone(), user.clone()));
                }
            }
        });

        Self {
            queue,
            rooms,
            projection: Arc::clone(projection),
            listener,
            disposed: AtomicBool::new(false),
        }
    }

    /// Start protecting `room`, enqueueing bans for members already
    /// targeted by a policy. Returns false when the room was already
    /// protected.
    pub fn add_protected_room(&self, room: RoomId) -> bool {
        if self.is_disposed() {
            return false;
        }
        if !self.rooms.write().insert(room.clone()) {
            return false;
        }
        for user in self.projection.current().users_to_ban(&room) {
            drop(self.queue.enqueue(room.clone(), user));
        }
        true
    }

    pub fn remove_protected_room(&self, room: &RoomId) -> bool {
        self.rooms.write().remove(room)
    }

    pub fn protected_rooms(&self) -> Vec<RoomId> {
        self.rooms.read().iter().cloned().collect()
    }

    /// Enqueue every member of a protected `room` that must be banned and
    /// wait for the batches they land in. Returns how many users were
    /// enqueued; an unprotected room enqueues nothing.
    pub async fn sync_room(&self, room: &RoomId) -> ActionResult<usize> {
        if !self.rooms.read().contains(room) {
            return Ok(0);
        }
        let users = self.projection.current().users_to_ban(room);
        let waiters: Vec<_> = users
            .iter()
            .map(|user| self.queue.enqueue(room.clone(), user.clone()))
            .collect();
        for outcome in join_all(waiters).await {
            outcome?;
        }
        Ok(users.len())
    }

    pub fn is_processing(&self, room: &RoomId) -> bool {
        self.queue.is_processing(room)
    }
}

impl Describe for UserBanSynchronisation {
    fn name(&self) -> &str {
        "UserBanSynchronisationProtection"
    }

    fn description(&self) -> &str {
        "Bans members of protected rooms that match user ban policies"
    }
}

impl Protection for UserBanSynchronisation {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.projection.remove_node_listener(self.listener);
        debug!("user ban synchronisation disposed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for UserBanSynchronisation {
    fn drop(&mut self) {
        self.dispose();
    }
}
