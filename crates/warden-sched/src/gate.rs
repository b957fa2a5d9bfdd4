//! TimedGate - rate-limits how often a background task runs.
//!
//! ```text
//!            enqueue_open()                 batch fires
//!   Idle ─────────────────► BatchScheduled ───────────► TaskActive
//!    ▲                                                   │    │
//!    │            task completes, no follow-up           │    │ enqueue_open()
//!    └───────────────────────────────────────────────────┘    ▼
//!                                             TaskActiveWithFollowup
//!                                                        │
//!                 task completes: enqueue_open() again ◄─┘
//! ```
//!
//! At most one task runs at a time and at most one follow-up waits behind
//! it, however often `enqueue_open` is called. Consecutive opens are spaced
//! at least `delay` apart, measured from the previous open.

use crate::batch::ConstantPeriodBatch;
use crate::error::{guarded, ActionResult};
use crate::reporter::TaskFailureReporter;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Produces a fresh background task for every open.
pub type TaskFactory = Arc<dyn Fn() -> BoxFuture<'static, ActionResult<()>> + Send + Sync>;

const SCOPE: &str = "timed-gate";

pub struct TimedGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    delay: Duration,
    factory: TaskFactory,
    reporter: Arc<dyn TaskFailureReporter>,
    state: Mutex<GateState>,
}

#[derive(Default)]
struct GateState {
    last_open_at: Option<Instant>,
    pending: Option<PendingOpen>,
    task: Option<ActiveTask>,
    opens: u64,
    batches: u64,
    destroyed: bool,
}

/// A scheduled open. Stays in place after its batch fires until `open`
/// consumes it under the state lock.
struct PendingOpen {
    id: u64,
    batch: ConstantPeriodBatch,
}

struct ActiveTask {
    open: u64,
    follow_up: bool,
}

impl TimedGate {
    pub fn new<F, Fut>(delay: Duration, factory: F, reporter: Arc<dyn TaskFailureReporter>) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult<()>> + Send + 'static,
    {
        let factory: TaskFactory = Arc::new(move || factory().boxed());
        Self {
            inner: Arc::new(GateInner {
                delay,
                factory,
                reporter,
                state: Mutex::new(GateState::default()),
            }),
        }
    }

    /// Request a run of the task.
    pub fn enqueue_open(&self) {
        self.inner.enqueue_open();
    }

    /// Stop all further scheduling. An in-flight task runs to completion
    /// but will not trigger its follow-up.
    pub fn destroy(&self) {
        let mut state = self.inner.state.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        if let Some(pending) = state.pending.take() {
            pending.batch.cancel();
        }
        state.task = None;
        debug!("timed gate destroyed");
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().task.is_some()
    }

    pub fn is_scheduled(&self) -> bool {
        let state = self.inner.state.lock();
        state
            .pending
            .as_ref()
            .map_or(false, |pending| !pending.batch.is_finished())
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }
}

impl Drop for TimedGate {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for TimedGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedGate")
            .field("delay", &self.inner.delay)
            .field("active", &self.is_active())
            .field("scheduled", &self.is_scheduled())
            .finish()
    }
}

impl GateInner {
    fn enqueue_open(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        if let Some(task) = state.task.as_mut() {
            task.follow_up = true;
            debug!("task active, follow-up queued");
            return;
        }
        if state.pending.is_some() {
            return;
        }

        let remaining = match state.last_open_at {
            Some(at) => self.delay.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        };
        debug!(remaining_ms = remaining.as_millis() as u64, "open scheduled");
        state.batches += 1;
        let id = state.batches;
        let gate: Weak<GateInner> = Arc::downgrade(self);
        let batch = ConstantPeriodBatch::create(
            move || {
                if let Some(gate) = gate.upgrade() {
                    gate.open(id);
                }
            },
            remaining,
        );
        state.pending = Some(PendingOpen { id, batch });
    }

    fn open(self: &Arc<Self>, id: u64) {
        let open = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            match state.pending.as_ref() {
                Some(pending) if pending.id == id => state.pending = None,
                _ => return,
            }
            if state.task.is_some() {
                debug!("task already active, open skipped");
                return;
            }
            state.last_open_at = Some(Instant::now());
            state.opens += 1;
            let open = state.opens;
            state.task = Some(ActiveTask {
                open,
                follow_up: false,
            });
            open
        };

        let factory = Arc::clone(&self.factory);
        let gate = Arc::clone(self);
        tokio::spawn(async move {
            let result = guarded(async move { factory().await }).await;
            gate.complete(open, result);
        });
    }

    fn complete(self: &Arc<Self>, open: u64, result: ActionResult<()>) {
        if let Err(error) = &result {
            self.reporter.report(SCOPE, error);
        }
        let follow_up = {
            let mut state = self.state.lock();
            match state.task.take() {
                Some(task) if task.open == open => task.follow_up,
                other => {
                    state.task = other;
                    false
                }
            }
        };
        if follow_up {
            self.enqueue_open();
        }
    }
}
