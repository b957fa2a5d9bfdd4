//! Warden Sched - coalescing schedulers for applying intent to external targets
//!
//! Every scheduler here solves the same problem: apply the latest known
//! intent to a slow, rate-limited target with at most one operation in
//! flight and at most one queued follow-up.
//!
//! - [`batch`] - [`ConstantPeriodBatch`], a cancellable single-shot deferred callback
//! - [`gate`] - [`TimedGate`], rate-limits how often one background task runs
//! - [`queue`] - [`KeyedBatchQueue`], per-key request batching with shared outcomes
//! - [`check`] - [`PerKeyCoalescingCheck`], per-key checks that collapse bursts
//!   into one follow-up using the freshest intent
//! - [`capability`] - the external effect contracts schedulers drive
//! - [`reporter`] - where background failures go
//! - [`error`] - Error types
//!
//! All bookkeeping happens synchronously under short-lived locks that are
//! never held across an `.await`; the only suspension points are deferred
//! timers and the external calls themselves. Every scheduler must be used
//! from within a tokio runtime.

pub mod batch;
pub mod capability;
pub mod check;
pub mod error;
pub mod gate;
pub mod queue;
pub mod reporter;

pub use batch::ConstantPeriodBatch;
pub use capability::{BatchProcessor, Capability, FnBatchProcessor, FnCapability};
pub use check::{CheckHandle, PerKeyCoalescingCheck};
pub use error::{ActionError, ActionResult};
pub use gate::TimedGate;
pub use queue::KeyedBatchQueue;
pub use reporter::{MemoryReporter, TaskFailureReporter, TracingReporter};
