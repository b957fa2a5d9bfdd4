//! Room state gateway abstractions.

use crate::acl::ServerAcl;
use crate::error::{Result, SdkError};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use warden_core::{RoomId, UserId};

/// Reads and writes the room state Warden reconciles.
#[async_trait]
pub trait RoomStateGateway: Send + Sync + 'static {
    /// Current ACL of `room`, `None` when the room has no ACL yet.
    async fn server_acl(&self, room: &RoomId) -> Result<Option<ServerAcl>>;

    /// Replace the ACL of `room`.
    async fn send_server_acl(&self, room: &RoomId, acl: &ServerAcl) -> Result<()>;

    /// Ban every user in `users` from `room`.
    async fn ban_users(&self, room: &RoomId, users: &[UserId]) -> Result<()>;
}

/// An effect the [`MemoryGateway`] performed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    AclSent { room: RoomId, acl: ServerAcl },
    UsersBanned { room: RoomId, users: Vec<UserId> },
}

#[derive(Clone, Debug, Default)]
struct MemoryRoom {
    acl: Option<ServerAcl>,
    banned: BTreeSet<UserId>,
}

/// In-memory gateway for testing and simulation.
///
/// Every call waits `latency` before touching state, and rooms can be
/// marked failing to exercise error paths.
pub struct MemoryGateway {
    latency: Duration,
    rooms: RwLock<HashMap<RoomId, MemoryRoom>>,
    failing: RwLock<HashSet<RoomId>>,
    effects: Mutex<Vec<Effect>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            rooms: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashSet::new()),
            effects: Mutex::new(Vec::new()),
        }
    }

    pub fn add_room(&self, room: impl Into<RoomId>) {
        self.rooms.write().entry(room.into()).or_default();
    }

    /// Overwrite a room's ACL as if someone else had changed it.
    pub fn set_acl(&self, room: &RoomId, acl: Option<ServerAcl>) {
        self.rooms.write().entry(room.clone()).or_default().acl = acl;
    }

    /// Make every call touching `room` fail until [`heal_room`](Self::heal_room).
    pub fn fail_room(&self, room: impl Into<RoomId>) {
        self.failing.write().insert(room.into());
    }

    pub fn heal_room(&self, room: &RoomId) {
        self.failing.write().remove(room);
    }

    pub fn acl(&self, room: &RoomId) -> Option<ServerAcl> {
        self.rooms.read().get(room).and_then(|state| state.acl.clone())
    }

    pub fn banned(&self, room: &RoomId) -> BTreeSet<UserId> {
        self.rooms
            .read()
            .get(room)
            .map(|state| state.banned.clone())
            .unwrap_or_default()
    }

    pub fn effects(&self) -> Vec<Effect> {
        self.effects.lock().clone()
    }

    /// Number of ACL updates sent to `room`.
    pub fn acl_sends(&self, room: &RoomId) -> usize {
        self.effects
            .lock()
            .iter()
            .filter(|effect| matches!(effect, Effect::AclSent { room: r, .. } if r == room))
            .count()
    }

    async fn enter(&self, room: &RoomId) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.read().contains(room) {
            return Err(SdkError::Gateway {
                room: room.clone(),
                message: "injected failure".to_string(),
            });
        }
        if !self.rooms.read().contains_key(room) {
            return Err(SdkError::RoomNotFound(room.clone()));
        }
        Ok(())
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomStateGateway for MemoryGateway {
    async fn server_acl(&self, room: &RoomId) -> Result<Option<ServerAcl>> {
        self.enter(room).await?;
        Ok(self.acl(room))
    }

    async fn send_server_acl(&self, room: &RoomId, acl: &ServerAcl) -> Result<()> {
        self.enter(room).await?;
        self.set_acl(room, Some(acl.clone()));
        self.effects.lock().push(Effect::AclSent {
            room: room.clone(),
            acl: acl.clone(),
        });
        Ok(())
    }

    async fn ban_users(&self, room: &RoomId, users: &[UserId]) -> Result<()> {
        self.enter(room).await?;
        if let Some(state) = self.rooms.write().get_mut(room) {
            state.banned.extend(users.iter().cloned());
        }
        self.effects.lock().push(Effect::UsersBanned {
            room: room.clone(),
            users: users.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_gateway_records_effects() {
        let gateway = MemoryGateway::new();
        let room = RoomId::new("!a:example.org");
        gateway.add_room(room.clone());

        assert_eq!(gateway.server_acl(&room).await, Ok(None));
        let acl = ServerAcl::new(["*"], ["evil.example"], false);
        gateway.send_server_acl(&room, &acl).await.unwrap();
        gateway.ban_users(&room, &[UserId::new("@spam:evil.example")]).await.unwrap();

        assert_eq!(gateway.server_acl(&room).await, Ok(Some(acl.clone())));
        assert_eq!(gateway.acl_sends(&room), 1);
        assert_eq!(gateway.banned(&room).len(), 1);
        assert_eq!(gateway.effects().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_failing_rooms() {
        let gateway = MemoryGateway::new();
        let room = RoomId::new("!a:example.org");
        assert_eq!(
            gateway.server_acl(&room).await,
            Err(SdkError::RoomNotFound(room.clone()))
        );

        gateway.add_room(room.clone());
        gateway.fail_room(room.clone());
        assert!(matches!(
            gateway.ban_users(&room, &[]).await,
            Err(SdkError::Gateway { .. })
        ));
        gateway.heal_room(&room);
        assert_eq!(gateway.ban_users(&room, &[]).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_applies_to_every_call() {
        let gateway = MemoryGateway::with_latency(Duration::from_millis(30));
        let room = RoomId::new("!a:example.org");
        gateway.add_room(room.clone());

        let start = tokio::time::Instant::now();
        gateway.server_acl(&room).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
