//! Error types for scheduled external effects.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use ulid::Ulid;

/// Outcome of an external effect. Cloned to every waiter coalesced into the
/// same operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Action failed: {message}")]
    Failed { message: String },

    #[error("Unknown failure ({correlation_id}): {cause}")]
    Unknown { correlation_id: Ulid, cause: String },

    #[error("Action abandoned before an outcome was produced")]
    Abandoned,
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        ActionError::Failed {
            message: message.into(),
        }
    }

    /// Wrap an unexpected failure under a fresh correlation id.
    pub fn unknown(cause: impl Into<String>) -> Self {
        ActionError::Unknown {
            correlation_id: Ulid::new(),
            cause: cause.into(),
        }
    }

    pub fn correlation_id(&self) -> Option<Ulid> {
        match self {
            ActionError::Unknown { correlation_id, .. } => Some(*correlation_id),
            _ => None,
        }
    }
}

pub type ActionResult<T> = std::result::Result<T, ActionError>;

/// Run an external effect, turning a panic inside it into
/// [`ActionError::Unknown`].
pub(crate) async fn guarded<T, F>(effect: F) -> ActionResult<T>
where
    F: Future<Output = ActionResult<T>>,
{
    match AssertUnwindSafe(effect).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(ActionError::unknown(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
