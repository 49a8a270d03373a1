//! Media sharing record and item types

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use super::Metadata;
use crate::error::{MediaSharingError, Result};

/// Record type tag carried on store events
pub const MEDIA_SHARING_RECORD_TYPE: &str = "MediaSharingRecord";

/// Protocol state of a media sharing record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaSharingState {
    /// Created locally, nothing sent yet (sender only)
    Created,
    /// Items have been shared (terminal)
    MediaShared,
}

impl MediaSharingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSharingState::Created => "created",
            MediaSharingState::MediaShared => "media-shared",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MediaSharingState::MediaShared)
    }
}

impl fmt::Display for MediaSharingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaSharingState {
    type Err = MediaSharingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(MediaSharingState::Created),
            "media-shared" => Ok(MediaSharingState::MediaShared),
            other => Err(MediaSharingError::Validation(format!(
                "Unknown media sharing state: {}",
                other
            ))),
        }
    }
}

/// Which side of the exchange a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSharingRole {
    Sender,
    Receiver,
}

impl MediaSharingRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSharingRole::Sender => "sender",
            MediaSharingRole::Receiver => "receiver",
        }
    }
}

impl fmt::Display for MediaSharingRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaSharingRole {
    type Err = MediaSharingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sender" => Ok(MediaSharingRole::Sender),
            "receiver" => Ok(MediaSharingRole::Receiver),
            other => Err(MediaSharingError::Validation(format!(
                "Unknown media sharing role: {}",
                other
            ))),
        }
    }
}

/// One shared media reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub mime_type: String,
    /// Opaque reference, never fetched here
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Per-item metadata, transmitted to the peer as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl MediaItem {
    pub fn new(mime_type: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            uri: uri.into(),
            description: None,
            byte_count: None,
            file_name: None,
            metadata: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_byte_count(mut self, byte_count: u64) -> Self {
        self.byte_count = Some(byte_count);
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check required fields are present and non-empty
    pub fn validate(&self) -> Result<()> {
        if self.mime_type.trim().is_empty() {
            return Err(MediaSharingError::Validation(
                "Media item mimeType must not be empty".to_string(),
            ));
        }
        if self.uri.trim().is_empty() {
            return Err(MediaSharingError::Validation(
                "Media item uri must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hex SHA-256 over the canonical CBOR encoding of an item list
pub fn items_digest(items: &[MediaItem]) -> Result<String> {
    let mut bytes = Vec::new();
    ciborium::into_writer(items, &mut bytes)
        .map_err(|e| MediaSharingError::Serialization(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Local view of one share exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSharingRecord {
    pub id: String,
    pub connection_id: String,
    /// Set on first message, immutable afterwards
    pub thread_id: Option<String>,
    pub state: MediaSharingState,
    pub role: MediaSharingRole,
    pub description: Option<String>,
    /// Empty until shared; order is display order
    pub items: Vec<MediaItem>,
    /// Sender-local context, never sent to the peer
    pub metadata: Metadata,
    pub created_at: i64,
    pub updated_at: i64,
}

impl MediaSharingRecord {
    /// New sender-side record in `Created` state
    pub fn new_sender(
        connection_id: impl Into<String>,
        metadata: Metadata,
        description: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id: connection_id.into(),
            thread_id: None,
            state: MediaSharingState::Created,
            role: MediaSharingRole::Sender,
            description,
            items: Vec::new(),
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// New receiver-side record, materialized directly as shared
    pub fn new_receiver(
        connection_id: impl Into<String>,
        thread_id: impl Into<String>,
        items: Vec<MediaItem>,
        description: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id: connection_id.into(),
            thread_id: Some(thread_id.into()),
            state: MediaSharingState::MediaShared,
            role: MediaSharingRole::Receiver,
            description,
            items,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn items_digest(&self) -> Result<String> {
        items_digest(&self.items)
    }
}
