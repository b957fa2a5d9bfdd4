// File: `crates/warden-core/src/lib.rs`
pub mod ids;
pub mod membership;
pub mod node;
pub mod policy;
pub mod revision;
pub mod server_ban;
pub mod set_delta;
pub mod user_ban;

pub use ids::{PolicyId, RoomId, UserId};
pub use node::ProjectionNode;
pub use revision::{RevisionClock, RevisionId};
pub use set_delta::SetDelta;
