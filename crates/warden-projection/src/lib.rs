//! Warden Projection - the incremental dataflow engine
//!
//! A [`Projection`] owns the current revision of one [`ProjectionNode`] and
//! moves it forward one upstream delta at a time, without recomputing from
//! scratch.
//!
//! ```text
//! On applyInput(i):
//!   d  = node.reduce_input(i)      // compute delta
//!   n' = node.reduce_delta(d)      // next node (pure)
//!   node = n'                      // atomic swap
//!   for o in outputs: o.apply(d)   // fan out, registration order
//!   for l in listeners: l(n', d, n)
//! ```
//!
//! Upstream revisions enter through a [`RevisionSource`]; the in-memory
//! [`RevisionIssuer`] is provided for wiring and tests.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use warden_core::policy::{Policy, PolicyKind, PolicyRevisionDelta};
//! use warden_core::server_ban::ServerBanIntentNode;
//! use warden_projection::{Projection, RevisionIssuer};
//!
//! let issuer = Arc::new(RevisionIssuer::new(0u64));
//! let projection = Projection::new(ServerBanIntentNode::new());
//! projection
//!     .attach_source(&issuer, |_rev: &u64, delta: &PolicyRevisionDelta| delta.clone())
//!     .unwrap();
//!
//! issuer.issue(1, PolicyRevisionDelta::adding([
//!     Policy::ban("p1", PolicyKind::Server, "evil.example"),
//! ]));
//! assert!(projection.current().is_denied("evil.example"));
//! ```
//!
//! [`ProjectionNode`]: warden_core::ProjectionNode

pub mod error;
pub mod listeners;
pub mod projection;
pub mod source;

pub use error::{ProjectionError, Result};
pub use listeners::{ListenerId, ListenerRegistry};
pub use projection::{NodeListener, Origin, Projection, ProjectionId};
pub use source::{RevisionIssuer, RevisionListener, RevisionSource};
