//! Media sharing protocol messages
//!
//! A single message type carries a list of media references from the sender
//! to the receiver. Payloads are already-decrypted JSON-shaped values; the
//! codec never touches the transport or encryption layers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MediaSharingError, Result};
use crate::models::MediaItem;

/// Protocol family and version
pub const MEDIA_SHARING_PROTOCOL: &str = "media-sharing/1.0";

/// Message type string of the share message
pub const SHARE_MEDIA_TYPE: &str = "media-sharing/1.0/share-media";

/// Every message kind this protocol defines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ShareMedia,
}

impl MessageKind {
    pub const ALL: &'static [MessageKind] = &[MessageKind::ShareMedia];

    pub fn type_str(&self) -> &'static str {
        match self {
            MessageKind::ShareMedia => SHARE_MEDIA_TYPE,
        }
    }

    pub fn from_type_str(message_type: &str) -> Option<Self> {
        MessageKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.type_str() == message_type)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_str())
    }
}

/// Share message sent once per record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareMediaMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub thread_id: String,
    pub items: Vec<MediaItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ShareMediaMessage {
    pub fn new(thread_id: impl Into<String>, items: Vec<MediaItem>) -> Self {
        Self {
            message_type: SHARE_MEDIA_TYPE.to_string(),
            thread_id: thread_id.into(),
            items,
            description: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

/// Read the `type` field of an envelope, if any
pub fn message_type_of(payload: &serde_json::Value) -> Option<&str> {
    payload.get("type").and_then(serde_json::Value::as_str)
}

/// Codec for the media sharing protocol
#[derive(Debug, Clone, Default)]
pub struct MediaSharingCodec;

impl MediaSharingCodec {
    /// Encode a share message to its JSON envelope
    pub fn encode(msg: &ShareMediaMessage) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(msg)?)
    }

    /// Decode and validate a share message envelope
    pub fn decode(payload: &serde_json::Value) -> Result<ShareMediaMessage> {
        match message_type_of(payload) {
            Some(SHARE_MEDIA_TYPE) => {}
            Some(other) => {
                return Err(MediaSharingError::MalformedMessage(format!(
                    "Expected type {}, got {}",
                    SHARE_MEDIA_TYPE, other
                )))
            }
            None => {
                return Err(MediaSharingError::MalformedMessage(
                    "Missing message type".to_string(),
                ))
            }
        }

        match payload.get("items") {
            Some(serde_json::Value::Array(_)) => {}
            Some(_) => {
                return Err(MediaSharingError::MalformedMessage(
                    "items must be a sequence".to_string(),
                ))
            }
            None => {
                return Err(MediaSharingError::MalformedMessage(
                    "Missing items".to_string(),
                ))
            }
        }

        let msg: ShareMediaMessage = serde_json::from_value(payload.clone())
            .map_err(|e| MediaSharingError::MalformedMessage(e.to_string()))?;

        if msg.thread_id.is_empty() {
            return Err(MediaSharingError::MalformedMessage(
                "threadId must not be empty".to_string(),
            ));
        }

        Ok(msg)
    }

    /// Encode a JSON envelope to CBOR bytes for binary transports
    pub fn encode_cbor(payload: &serde_json::Value) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(payload, &mut bytes)
            .map_err(|e| MediaSharingError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    /// Decode CBOR bytes back to a JSON envelope
    pub fn decode_cbor(bytes: &[u8]) -> Result<serde_json::Value> {
        ciborium::from_reader(bytes).map_err(|e| MediaSharingError::MalformedMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use serde_json::json;

    #[test]
    fn test_encode_wire_shape() {
        let msg = ShareMediaMessage::new(
            "thread-1",
            vec![MediaItem::new("image/png", "http://x")
                .with_metadata(Metadata::new().with("duration", 14))],
        );

        let encoded = MediaSharingCodec::encode(&msg).unwrap();
        assert_eq!(
            encoded,
            json!({
                "type": "media-sharing/1.0/share-media",
                "threadId": "thread-1",
                "items": [
                    { "mimeType": "image/png", "uri": "http://x", "metadata": { "duration": 14 } }
                ]
            })
        );

        let decoded = MediaSharingCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let payload = json!({
            "type": SHARE_MEDIA_TYPE,
            "threadId": "t",
            "items": [],
            "@id": "abc",
        });
        let msg = MediaSharingCodec::decode(&payload).unwrap();
        assert!(msg.items.is_empty());
    }

    #[test]
    fn test_decode_rejects_missing_items() {
        let payload = json!({ "type": SHARE_MEDIA_TYPE, "threadId": "t" });
        assert!(matches!(
            MediaSharingCodec::decode(&payload),
            Err(MediaSharingError::MalformedMessage(_))
        ));

        let payload = json!({ "type": SHARE_MEDIA_TYPE, "threadId": "t", "items": {"uri": "x"} });
        assert!(matches!(
            MediaSharingCodec::decode(&payload),
            Err(MediaSharingError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_decode_rejects_item_without_uri_or_mime_type() {
        let no_uri = json!({
            "type": SHARE_MEDIA_TYPE,
            "threadId": "t",
            "items": [{ "mimeType": "image/png" }]
        });
        assert!(matches!(
            MediaSharingCodec::decode(&no_uri),
            Err(MediaSharingError::MalformedMessage(_))
        ));

        let no_mime = json!({
            "type": SHARE_MEDIA_TYPE,
            "threadId": "t",
            "items": [{ "uri": "http://x" }]
        });
        assert!(matches!(
            MediaSharingCodec::decode(&no_mime),
            Err(MediaSharingError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_type_and_thread() {
        let wrong_type = json!({ "type": "basicmessage/1.0/message", "threadId": "t", "items": [] });
        assert!(MediaSharingCodec::decode(&wrong_type).is_err());

        let no_thread = json!({ "type": SHARE_MEDIA_TYPE, "items": [] });
        assert!(MediaSharingCodec::decode(&no_thread).is_err());

        let empty_thread = json!({ "type": SHARE_MEDIA_TYPE, "threadId": "", "items": [] });
        assert!(MediaSharingCodec::decode(&empty_thread).is_err());
    }

    #[test]
    fn test_cbor_frame_preserves_envelope() {
        let msg = ShareMediaMessage::new(
            "thread-1",
            vec![MediaItem::new("video/mp4", "http://v").with_byte_count(2048)],
        )
        .with_description(Some("clip".to_string()));
        let envelope = MediaSharingCodec::encode(&msg).unwrap();

        let bytes = MediaSharingCodec::encode_cbor(&envelope).unwrap();
        let back = MediaSharingCodec::decode_cbor(&bytes).unwrap();
        assert_eq!(back, envelope);

        assert!(MediaSharingCodec::decode_cbor(&[0xff, 0x00]).is_err());
    }

    #[test]
    fn test_message_kind_lookup() {
        assert_eq!(
            MessageKind::from_type_str(SHARE_MEDIA_TYPE),
            Some(MessageKind::ShareMedia)
        );
        assert_eq!(MessageKind::from_type_str("other/1.0/x"), None);
        assert!(SHARE_MEDIA_TYPE.starts_with(MEDIA_SHARING_PROTOCOL));
    }
}
