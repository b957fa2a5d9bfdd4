//! PerKeyCoalescingCheck - one check per key at a time, bursts collapse into
//! a single follow-up that runs with the freshest intent.
//!
//! ```text
//! enqueue_check(k, intent):
//!     latest[k] = intent
//!     pending[k] exists?  → join it
//!     active[k] exists?   → pending[k] = { await active; promote; check(latest[k]) }
//!     otherwise           → active[k]  = check(intent)
//! ```
//!
//! The follow-up reads `latest[k]` when it starts running rather than when
//! it was requested, so every caller folded into it sees the outcome of a
//! check against the most recent intent. A key with neither an active nor
//! a pending check is dropped from the map.

use crate::capability::Capability;
use crate::error::{guarded, ActionError, ActionResult};
use crate::reporter::TaskFailureReporter;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

/// Cloneable handle on the outcome of one (possibly shared) check.
pub type CheckHandle = Shared<BoxFuture<'static, ActionResult<bool>>>;

const SCOPE: &str = "per-key-check";

pub struct PerKeyCoalescingCheck<K, I> {
    inner: Arc<CheckInner<K, I>>,
}

struct CheckInner<K, I> {
    capability: Arc<dyn Capability<K, I>>,
    reporter: Arc<dyn TaskFailureReporter>,
    state: Mutex<CheckState<K, I>>,
}

struct CheckState<K, I> {
    next_check: u64,
    keys: HashMap<K, KeyState<I>>,
}

struct KeyState<I> {
    active: Option<Slot>,
    pending: Option<Slot>,
    latest: I,
}

struct Slot {
    check: u64,
    handle: CheckHandle,
}

impl<K, I> PerKeyCoalescingCheck<K, I>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    I: Clone + Send + Sync + 'static,
{
    pub fn new(capability: Arc<dyn Capability<K, I>>, reporter: Arc<dyn TaskFailureReporter>) -> Self {
        Self {
            inner: Arc::new(CheckInner {
                capability,
                reporter,
                state: Mutex::new(CheckState {
                    next_check: 0,
                    keys: HashMap::new(),
                }),
            }),
        }
    }

    /// Request a check of `key` against `intent`.
    ///
    /// The check is driven by a spawned task, so it completes even if every
    /// handle is dropped.
    pub fn enqueue_check(&self, key: K, intent: I) -> CheckHandle {
        let handle = {
            let mut state = self.inner.state.lock();
            state.next_check += 1;
            let check = state.next_check;
            let entry = state.keys.entry(key.clone()).or_insert_with(|| KeyState {
                active: None,
                pending: None,
                latest: intent.clone(),
            });
            entry.latest = intent.clone();

            if let Some(pending) = &entry.pending {
                debug!(key = ?key, "joining pending follow-up");
                return pending.handle.clone();
            }
            match &entry.active {
                Some(active) => {
                    debug!(key = ?key, "check active, scheduling follow-up");
                    let handle = CheckInner::follow_up(&self.inner, key, check, active.handle.clone());
                    entry.pending = Some(Slot {
                        check,
                        handle: handle.clone(),
                    });
                    handle
                }
                None => {
                    let handle = CheckInner::run(&self.inner, key, check, intent);
                    entry.active = Some(Slot {
                        check,
                        handle: handle.clone(),
                    });
                    handle
                }
            }
        };

        tokio::spawn(handle.clone());
        handle
    }

    /// Keys with an active or pending check.
    pub fn tracked_keys(&self) -> usize {
        self.inner.state.lock().keys.len()
    }

    pub fn is_active(&self, key: &K) -> bool {
        self.inner
            .state
            .lock()
            .keys
            .get(key)
            .map_or(false, |entry| entry.active.is_some())
    }

    pub fn has_pending(&self, key: &K) -> bool {
        self.inner
            .state
            .lock()
            .keys
            .get(key)
            .map_or(false, |entry| entry.pending.is_some())
    }
}

impl<K, I> CheckInner<K, I>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    I: Clone + Send + Sync + 'static,
{
    fn run(inner: &Arc<Self>, key: K, check: u64, intent: I) -> CheckHandle {
        let inner = Arc::clone(inner);
        async move {
            let result = guarded(inner.capability.apply(&key, &intent)).await;
            inner.complete(&key, check, &result);
            result
        }
        .boxed()
        .shared()
    }

    fn follow_up(inner: &Arc<Self>, key: K, check: u64, previous: CheckHandle) -> CheckHandle {
        let inner = Arc::clone(inner);
        async move {
            // The outcome of the check being waited on belongs to its own callers.
            let _ = previous.await;
            let intent = {
                let mut state = inner.state.lock();
                let Some(entry) = state.keys.get_mut(&key) else {
                    return Err(ActionError::Abandoned);
                };
                if entry.pending.as_ref().map(|slot| slot.check) == Some(check) {
                    entry.active = entry.pending.take();
                }
                entry.latest.clone()
            };
            let result = guarded(inner.capability.apply(&key, &intent)).await;
            inner.complete(&key, check, &result);
            result
        }
        .boxed()
        .shared()
    }

    fn complete(&self, key: &K, check: u64, result: &ActionResult<bool>) {
        if let Err(error) = result {
            self.reporter.report(SCOPE, error);
        }
        let mut state = self.state.lock();
        let idle = match state.keys.get_mut(key) {
            Some(entry) => {
                if entry.active.as_ref().map(|slot| slot.check) == Some(check) {
                    entry.active = None;
                }
                entry.active.is_none() && entry.pending.is_none()
            }
            None => false,
        };
        if idle {
            state.keys.remove(key);
        }
    }
}
