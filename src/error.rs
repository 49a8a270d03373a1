use thiserror::Error;

use crate::models::MediaSharingState;

#[derive(Error, Debug)]
pub enum MediaSharingError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record already exists: {0}")]
    DuplicateId(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Media sharing record not found: {0}")]
    RecordNotFound(String),

    #[error("Invalid state for {action} on record {record_id}: {state}")]
    InvalidState {
        record_id: String,
        state: MediaSharingState,
        action: &'static str,
    },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error("No handler registered for message type: {0}")]
    MissingHandler(String),

    #[error("Failed to send to connection {connection_id}: {reason}")]
    SendFailure {
        connection_id: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MediaSharingError>;

impl From<serde_json::Error> for MediaSharingError {
    fn from(err: serde_json::Error) -> Self {
        MediaSharingError::Serialization(err.to_string())
    }
}
