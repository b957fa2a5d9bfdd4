//! Warden SDK - reconciliation of moderation intent against rooms
//!
//! This SDK wires the projection engine and the coalescing schedulers into
//! the pieces a moderation bot runs: policy revisions flow into intent
//! projections, protections listen to those projections and the schedulers
//! apply the intent to rooms through a [`RoomStateGateway`].
//!
//! # Quick Start
//!
//! ```rust
//! use warden_core::policy::{Policy, PolicyKind, PolicyRevisionDelta};
//! use warden_core::RoomId;
//! use warden_sdk::{ReconcileConfigBuilder, Warden};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let config = ReconcileConfigBuilder::new().acl_resync_delay(10).build();
//!     let warden = Warden::new_with_memory_gateway(config).unwrap();
//!
//!     let room = RoomId::new("!lobby:example.org");
//!     warden.gateway().add_room(room.clone());
//!     warden.protect_room(room.clone());
//!
//!     warden.issue_policies(PolicyRevisionDelta::adding([
//!         Policy::ban("p1", PolicyKind::Server, "evil.example"),
//!     ]));
//!     warden.check_room_acl(room.clone()).await.unwrap();
//!
//!     let acl = warden.gateway().acl(&room).unwrap();
//!     assert_eq!(acl.deny, vec!["evil.example".to_string()]);
//! }
//! ```
//!
//! # Architecture
//!
//! - [`warden`] - Main entry point owning revision sources, projections and protections
//! - [`protection`] - Server ban and user ban synchronisation
//! - [`acl`] - Server ACL compilation and the per-room ACL queue
//! - [`gateway`] - Room state gateway abstractions
//! - [`registry`] - Capability and protection registries
//! - [`revision`] - Policy list and membership revisions
//! - [`config`] - Reconciliation configuration
//! - [`error`] - Error types

pub mod acl;
pub mod config;
pub mod error;
pub mod gateway;
pub mod protection;
pub mod registry;
pub mod revision;
pub mod warden;

// Re-exports for convenience
pub use acl::{ServerAcl, ServerAclCapability, ServerAclQueue};
pub use config::{ReconcileConfig, ReconcileConfigBuilder};
pub use error::{Result, SdkError};
pub use gateway::{Effect, MemoryGateway, RoomStateGateway};
pub use protection::{RoomBanProcessor, ServerBanSynchronisation, UserBanSynchronisation};
pub use registry::{
    CapabilityProvider, CapabilityRegistry, Describe, Description, Protection, ProtectionRegistry,
    Registry,
};
pub use revision::{MembershipRevision, PolicyListRevision};
pub use warden::Warden;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::ReconcileConfig;
    pub use crate::error::SdkError;
    pub use crate::gateway::{MemoryGateway, RoomStateGateway};
    pub use crate::registry::{Describe, Protection};
    pub use crate::warden::Warden;
    pub use warden_core::policy::{Policy, PolicyKind, PolicyRevisionDelta};
    pub use warden_core::membership::MembershipRevisionDelta;
    pub use warden_core::{RoomId, UserId};
}
