//! Error types for the Warden SDK.

use thiserror::Error;
use warden_core::RoomId;
use warden_projection::ProjectionError;
use warden_sched::ActionError;

/// Error type for SDK operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdkError {
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("Gateway error in {room}: {message}")]
    Gateway { room: RoomId, message: String },

    #[error("Already registered: {0}")]
    DuplicateName(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),
}

impl From<serde_json::Error> for SdkError {
    fn from(error: serde_json::Error) -> Self {
        SdkError::Config(error.to_string())
    }
}

impl From<SdkError> for ActionError {
    fn from(error: SdkError) -> Self {
        ActionError::failed(error.to_string())
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
