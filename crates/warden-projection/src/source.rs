//! Upstream revision sources.

use crate::listeners::{ListenerId, ListenerRegistry};
use parking_lot::RwLock;
use std::sync::Arc;

/// Callback invoked with every `(revision, delta)` pair.
pub type RevisionListener<R, D> = dyn Fn(&R, &D) + Send + Sync;

/// Anything that emits revisions together with the delta from the previous one.
///
/// Implementations must deliver deltas to each registered listener exactly
/// once and in the order they were produced.
pub trait RevisionSource<R, D>: Send + Sync {
    fn on_revision(&self, listener: Arc<RevisionListener<R, D>>) -> ListenerId;

    /// Returns false when `id` was not registered.
    fn off_revision(&self, id: ListenerId) -> bool;
}

/// In-memory revision source holding the latest revision.
pub struct RevisionIssuer<R, D> {
    current: RwLock<Arc<R>>,
    listeners: ListenerRegistry<RevisionListener<R, D>>,
}

impl<R, D> RevisionIssuer<R, D> {
    pub fn new(initial: R) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            listeners: ListenerRegistry::new(),
        }
    }

    /// The latest issued revision.
    pub fn current_revision(&self) -> Arc<R> {
        Arc::clone(&self.current.read())
    }

    /// Replace the current revision and notify every listener in
    /// registration order.
    pub fn issue(&self, revision: R, delta: D) {
        let revision = Arc::new(revision);
        *self.current.write() = Arc::clone(&revision);
        for listener in self.listeners.snapshot() {
            listener(&revision, &delta);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<R, D> RevisionSource<R, D> for RevisionIssuer<R, D>
where
    R: Send + Sync,
    D: Send + Sync,
{
    fn on_revision(&self, listener: Arc<RevisionListener<R, D>>) -> ListenerId {
        self.listeners.add(listener)
    }

    fn off_revision(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}
