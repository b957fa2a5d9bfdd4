//! External effect contracts driven by the schedulers.

use crate::error::ActionResult;
use async_trait::async_trait;
use std::future::Future;

/// Applies intent to one external target.
///
/// Must be idempotent with respect to `intent`: applying the same intent
/// twice without external drift is a no-op the second time. Returns whether
/// the call caused an observable change.
#[async_trait]
pub trait Capability<K, I>: Send + Sync + 'static {
    async fn apply(&self, key: &K, intent: &I) -> ActionResult<bool>;
}

/// Processes one deduplicated batch of values queued for `key`.
#[async_trait]
pub trait BatchProcessor<K, V>: Send + Sync + 'static {
    async fn process(&self, key: &K, values: Vec<V>) -> ActionResult<()>;
}

/// Adapts an async closure into a [`Capability`].
pub struct FnCapability<F>(pub F);

#[async_trait]
impl<K, I, F, Fut> Capability<K, I> for FnCapability<F>
where
    K: Clone + Send + Sync + 'static,
    I: Clone + Send + Sync + 'static,
    F: Fn(K, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult<bool>> + Send + 'static,
{
    async fn apply(&self, key: &K, intent: &I) -> ActionResult<bool> {
        (self.0)(key.clone(), intent.clone()).await
    }
}

/// Adapts an async closure into a [`BatchProcessor`].
pub struct FnBatchProcessor<F>(pub F);

#[async_trait]
impl<K, V, F, Fut> BatchProcessor<K, V> for FnBatchProcessor<F>
where
    K: Clone + Send + Sync + 'static,
    V: Send + 'static,
    F: Fn(K, Vec<V>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult<()>> + Send + 'static,
{
    async fn process(&self, key: &K, values: Vec<V>) -> ActionResult<()> {
        (self.0)(key.clone(), values).await
    }
}
