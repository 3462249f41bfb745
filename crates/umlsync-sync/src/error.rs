use thiserror::Error;
use umlsync_core::{CanvasError, DurableId, IdentityError};
use umlsync_export::{DecodeError, EncodeError};

/// Failure reported by a Model Store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store unreachable, timed out or answered with a server error
    #[error("model store unavailable ({}): {message}", display_status(.status))]
    Network { status: Option<u16>, message: String },
    /// Store refused the request
    #[error("model store rejected request ({status}): {message}")]
    Validation { status: u16, message: String },
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: DurableId },
    /// A multi-record create failed and could not be undone
    #[error("{0}")]
    Integrity(String),
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "no response".to_string(), |s| s.to_string())
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("network error: {message}")]
    Network { status: Option<u16>, message: String },
    #[error("validation error ({status}): {message}")]
    Validation { status: u16, message: String },
    /// A link endpoint or a remote event names something this session has not bound
    #[error("unknown endpoint {0}")]
    UnknownEndpoint(DurableId),
    #[error("no element {0} in this diagram")]
    UnknownElement(DurableId),
    #[error("intermediate construct partially created: {0}")]
    ConstructIntegrity(String),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Canvas(#[from] CanvasError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("real-time channel: {0}")]
    Channel(String),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Network { status, message } => SyncError::Network { status, message },
            StoreError::Validation { status, message } => SyncError::Validation { status, message },
            StoreError::NotFound { id, .. } => SyncError::UnknownElement(id),
            StoreError::Integrity(message) => SyncError::ConstructIntegrity(message),
        }
    }
}
