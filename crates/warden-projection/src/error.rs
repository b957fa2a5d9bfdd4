//! Error types for the projection engine.

use crate::projection::ProjectionId;
use thiserror::Error;

/// Errors returned by a projection. `Disposed` and `SelfOutput` are
/// programming errors; `StaleDelivery` reports an upstream input that was
/// dropped because a newer one from the same upstream was already applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("Projection {0} has been disposed")]
    Disposed(ProjectionId),

    #[error("Projection {0} cannot be its own output")]
    SelfOutput(ProjectionId),

    #[error("Stale delivery from {upstream}: seq {seq} is not newer than {last}")]
    StaleDelivery {
        upstream: ProjectionId,
        seq: u64,
        last: u64,
    },
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
