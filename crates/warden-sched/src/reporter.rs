//! Task-failure reporting for background work.

use crate::error::ActionError;
use parking_lot::Mutex;
use tracing::error;

/// Receives every failure of work that runs detached from its caller.
pub trait TaskFailureReporter: Send + Sync {
    /// `scope` names the scheduler instance the failure came from.
    fn report(&self, scope: &str, error: &ActionError);
}

/// Reports failures as `tracing` error events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl TaskFailureReporter for TracingReporter {
    fn report(&self, scope: &str, failure: &ActionError) {
        match failure.correlation_id() {
            Some(correlation_id) => {
                error!(scope, %correlation_id, error = %failure, "background task failed")
            }
            None => error!(scope, error = %failure, "background task failed"),
        }
    }
}

/// Keeps every report in memory (for tests and simulation).
#[derive(Debug, Default)]
pub struct MemoryReporter {
    reports: Mutex<Vec<(String, ActionError)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, ActionError)> {
        self.reports.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskFailureReporter for MemoryReporter {
    fn report(&self, scope: &str, error: &ActionError) {
        self.reports.lock().push((scope.to_string(), error.clone()));
    }
}
