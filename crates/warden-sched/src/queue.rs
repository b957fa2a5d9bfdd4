//! KeyedBatchQueue - batches requests per key and shares each batch's outcome.
//!
//! ```text
//! enqueue(k, v) ─► pending[k].push((v, resolver))
//!                  └─ k not processing? mark it, spawn flush(k)
//!
//! flush(k): loop {
//!     take pending[k]          (empty → unmark k, stop)
//!     dedupe values, keeping first-occurrence order
//!     processor(k, values).await
//!     resolve every taken request with the same outcome
//! }
//! ```
//!
//! Exactly one flush runs per key. Values enqueued while a flush is in
//! flight land in the next pass of the same loop.

use crate::capability::BatchProcessor;
use crate::error::{guarded, ActionError, ActionResult};
use crate::reporter::TaskFailureReporter;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

const SCOPE: &str = "keyed-batch-queue";

pub struct KeyedBatchQueue<K, V> {
    inner: Arc<QueueInner<K, V>>,
}

struct QueueInner<K, V> {
    processor: Arc<dyn BatchProcessor<K, V>>,
    reporter: Arc<dyn TaskFailureReporter>,
    state: Mutex<QueueState<K, V>>,
}

struct QueueState<K, V> {
    pending: HashMap<K, Vec<Request<V>>>,
    processing: HashSet<K>,
}

struct Request<V> {
    value: V,
    resolver: oneshot::Sender<ActionResult<()>>,
}

impl<K, V> KeyedBatchQueue<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new(
        processor: Arc<dyn BatchProcessor<K, V>>,
        reporter: Arc<dyn TaskFailureReporter>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                processor,
                reporter,
                state: Mutex::new(QueueState {
                    pending: HashMap::new(),
                    processing: HashSet::new(),
                }),
            }),
        }
    }

    /// Queue `value` for `key`.
    ///
    /// The request is recorded before this returns; the returned future
    /// only waits for the outcome of the batch the value lands in, so
    /// dropping it does not withdraw the value.
    pub fn enqueue(&self, key: K, value: V) -> impl Future<Output = ActionResult<()>> + Send + 'static {
        let (resolver, outcome) = oneshot::channel();
        let start_flush = {
            let mut state = self.inner.state.lock();
            state
                .pending
                .entry(key.clone())
                .or_default()
                .push(Request { value, resolver });
            state.processing.insert(key.clone())
        };

        if start_flush {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.flush(key).await });
        }

        async move { outcome.await.unwrap_or(Err(ActionError::Abandoned)) }
    }

    pub fn is_processing(&self, key: &K) -> bool {
        self.inner.state.lock().processing.contains(key)
    }

    /// Requests waiting for the next flush of `key`.
    pub fn pending_len(&self, key: &K) -> usize {
        self.inner
            .state
            .lock()
            .pending
            .get(key)
            .map_or(0, Vec::len)
    }
}

impl<K, V> QueueInner<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    async fn flush(&self, key: K) {
        loop {
            let batch = {
                let mut state = self.state.lock();
                match state.pending.remove(&key) {
                    Some(batch) if !batch.is_empty() => batch,
                    _ => {
                        state.processing.remove(&key);
                        return;
                    }
                }
            };

            let values = distinct_values(&batch);
            debug!(key = ?key, requests = batch.len(), values = values.len(), "flushing batch");
            let result = guarded(self.processor.process(&key, values)).await;
            if let Err(error) = &result {
                self.reporter.report(SCOPE, error);
            }
            for request in batch {
                // The caller may have stopped waiting.
                let _ = request.resolver.send(result.clone());
            }
        }
    }
}

fn distinct_values<V: Eq + Hash + Clone>(batch: &[Request<V>]) -> Vec<V> {
    let mut seen = HashSet::with_capacity(batch.len());
    batch
        .iter()
        .filter(|request| seen.insert(&request.value))
        .map(|request| request.value.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::FnBatchProcessor;
    use crate::reporter::MemoryReporter;

    fn recording_queue() -> (KeyedBatchQueue<String, String>, Arc<Mutex<Vec<(String, Vec<String>)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&calls);
        let processor = FnBatchProcessor(move |key: String, values: Vec<String>| {
            log.lock().push((key, values));
            async { Ok::<(), ActionError>(()) }
        });
        let queue = KeyedBatchQueue::new(Arc::new(processor), Arc::new(MemoryReporter::new()));
        (queue, calls)
    }

    #[tokio::test]
    async fn test_enqueue_is_recorded_synchronously() {
        let (queue, calls) = recording_queue();
        let pending = queue.enqueue("room".into(), "a".into());

        assert!(queue.is_processing(&"room".to_string()));
        assert_eq!(queue.pending_len(&"room".to_string()), 1);
        assert!(calls.lock().is_empty());

        assert_eq!(pending.await, Ok(()));
        assert_eq!(calls.lock().len(), 1);
        assert!(!queue.is_processing(&"room".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_waiter_still_processed() {
        let (queue, calls) = recording_queue();
        drop(queue.enqueue("room".into(), "a".into()));
        queue.enqueue("room".into(), "b".into()).await.unwrap();

        let calls = calls.lock();
        assert_eq!(calls[0].1, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_keys_flush_independently() {
        let (queue, calls) = recording_queue();
        let a = queue.enqueue("one".into(), "x".into());
        let b = queue.enqueue("two".into(), "x".into());
        assert_eq!(a.await, Ok(()));
        assert_eq!(b.await, Ok(()));

        let mut keys: Vec<_> = calls.lock().iter().map(|(key, _)| key.clone()).collect();
        keys.sort();
        assert_eq!(keys, vec!["one".to_string(), "two".to_string()]);
    }
}
