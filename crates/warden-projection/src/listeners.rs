//! Typed, ordered listener registry.
//!
//! Dispatch always runs against a snapshot, so a listener removed during
//! dispatch still sees the event in progress and one added during dispatch
//! sees only later events.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Handle returned on registration, used to remove the listener again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct Entries<F: ?Sized> {
    next_id: u64,
    listeners: Vec<(ListenerId, Arc<F>)>,
}

/// Listeners in registration order.
pub struct ListenerRegistry<F: ?Sized> {
    entries: Mutex<Entries<F>>,
}

impl<F: ?Sized> ListenerRegistry<F> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Entries {
                next_id: 0,
                listeners: Vec::new(),
            }),
        }
    }

    pub fn add(&self, listener: Arc<F>) -> ListenerId {
        let mut entries = self.entries.lock();
        entries.next_id += 1;
        let id = ListenerId(entries.next_id);
        entries.listeners.push((id, listener));
        id
    }

    /// Returns false when `id` was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.listeners.len();
        entries.listeners.retain(|(existing, _)| *existing != id);
        entries.listeners.len() != before
    }

    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<F: ?Sized> Default for ListenerRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Callback = dyn Fn(&mut Vec<u32>) + Send + Sync;

    #[test]
    fn test_snapshot_keeps_registration_order() {
        let registry: ListenerRegistry<Callback> = ListenerRegistry::new();
        for i in 0..5 {
            registry.add(Arc::new(move |out: &mut Vec<u32>| out.push(i)));
        }

        let mut out = Vec::new();
        for listener in registry.snapshot() {
            listener(&mut out);
        }
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_remove_by_id() {
        let registry: ListenerRegistry<Callback> = ListenerRegistry::new();
        let first = registry.add(Arc::new(|out: &mut Vec<u32>| out.push(1)));
        let _second = registry.add(Arc::new(|out: &mut Vec<u32>| out.push(2)));

        assert!(registry.remove(first));
        assert!(!registry.remove(first));

        let mut out = Vec::new();
        for listener in registry.snapshot() {
            listener(&mut out);
        }
        assert_eq!(out, vec![2]);
    }

    #[test]
    fn test_ids_are_not_reused_after_clear() {
        let registry: ListenerRegistry<Callback> = ListenerRegistry::new();
        let first = registry.add(Arc::new(|_: &mut Vec<u32>| {}));
        registry.clear();
        let second = registry.add(Arc::new(|_: &mut Vec<u32>| {}));

        assert_ne!(first, second);
        assert_eq!(registry.len(), 1);
    }
}
