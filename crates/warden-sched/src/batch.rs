//! Single-shot deferred callback.
//!
//! ```text
//! create(cb, delay) ──► [pending] ──(delay elapses)──► cb() ──► [finished]
//!                           │
//!                        cancel() ─────────────────────────────► [finished]
//! ```
//!
//! Exactly one of "callback ran" or "cancelled" happens. Both paths race on
//! one atomic flag, so a cancel that loses the race is a no-op and a
//! callback that loses it never runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct ConstantPeriodBatch {
    finished: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ConstantPeriodBatch {
    /// Schedule `callback` to run once after `delay`.
    ///
    /// A zero delay still defers the callback to a later turn of the
    /// runtime; it never runs inside `create`.
    pub fn create<F>(callback: F, delay: Duration) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if claim(&flag) {
                callback();
            }
        });
        Self { finished, handle }
    }

    /// Schedule `callback` for the next turn of the runtime.
    pub fn soon<F>(callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::create(callback, Duration::ZERO)
    }

    /// True once the callback has started or the batch was cancelled.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Prevent the callback from running. No-op when already finished.
    pub fn cancel(&self) {
        if claim(&self.finished) {
            self.handle.abort();
        }
    }
}

impl std::fmt::Debug for ConstantPeriodBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantPeriodBatch")
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn claim(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}
