//! Membership revisions as emitted by the room membership revision issuer.

use crate::ids::{RoomId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipChange {
    Joined { room: RoomId, user: UserId },
    Left { room: RoomId, user: UserId },
}

/// Ordered membership changes between two revisions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRevisionDelta {
    pub changes: Vec<MembershipChange>,
}

impl MembershipRevisionDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(mut self, room: impl Into<RoomId>, user: impl Into<UserId>) -> Self {
        self.changes.push(MembershipChange::Joined {
            room: room.into(),
            user: user.into(),
        });
        self
    }

    pub fn leave(mut self, room: impl Into<RoomId>, user: impl Into<UserId>) -> Self {
        self.changes.push(MembershipChange::Left {
            room: room.into(),
            user: user.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
