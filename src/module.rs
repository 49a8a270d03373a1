//! Application-facing media sharing API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::RecordQuery;
use crate::error::Result;
use crate::models::{MediaItem, MediaSharingRecord, Metadata};
use crate::p2p::dispatch::{Dispatcher, InboundOutcome, MessageHandler};
use crate::p2p::protocols::MessageKind;
use crate::services::MediaSharingService;

/// Options for creating a sender-side record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMediaSharingOptions {
    pub connection_id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CreateMediaSharingOptions {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Options for sharing items on an existing record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareMediaOptions {
    pub record_id: String,
    pub items: Vec<MediaItem>,
}

impl ShareMediaOptions {
    pub fn new(record_id: impl Into<String>, items: Vec<MediaItem>) -> Self {
        Self {
            record_id: record_id.into(),
            items,
        }
    }
}

/// Media sharing module exposed to application code
#[derive(Clone)]
pub struct MediaSharingModule {
    service: Arc<MediaSharingService>,
}

impl MediaSharingModule {
    pub fn new(service: Arc<MediaSharingService>) -> Self {
        Self { service }
    }

    /// Create a record in `Created` state. Nothing is sent to the peer.
    pub async fn create(&self, options: CreateMediaSharingOptions) -> Result<MediaSharingRecord> {
        self.service
            .create_record(&options.connection_id, options.metadata, options.description)
            .await
    }

    /// Share items with the record's peer. One-shot per record.
    pub async fn share(&self, options: ShareMediaOptions) -> Result<MediaSharingRecord> {
        self.service
            .share_items(&options.record_id, options.items)
            .await
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<MediaSharingRecord>> {
        self.service.store().find_by_id(id)
    }

    pub fn get_by_id(&self, id: &str) -> Result<MediaSharingRecord> {
        self.service.store().get_by_id(id)
    }

    pub fn get_all(&self) -> Result<Vec<MediaSharingRecord>> {
        self.service.store().get_all()
    }

    pub fn find_all_by_query(&self, query: &RecordQuery) -> Result<Vec<MediaSharingRecord>> {
        self.service.store().find_by_query(query)
    }

    /// Delete a record. Waits for any share in progress on it to finish.
    pub async fn delete_by_id(&self, id: &str) -> Result<()> {
        self.service.store().delete_by_id(id).await
    }

    /// Register this module's inbound handlers
    pub fn register_handlers(&self, dispatcher: &mut Dispatcher) -> Result<()> {
        dispatcher.register(Arc::new(ShareMediaHandler {
            service: self.service.clone(),
        }))
    }
}

/// Inbound handler for share-media messages
struct ShareMediaHandler {
    service: Arc<MediaSharingService>,
}

#[async_trait]
impl MessageHandler for ShareMediaHandler {
    fn kind(&self) -> MessageKind {
        MessageKind::ShareMedia
    }

    async fn handle(
        &self,
        connection_id: &str,
        payload: &serde_json::Value,
    ) -> Result<InboundOutcome> {
        self.service
            .handle_inbound_payload(connection_id, payload)
            .await
    }
}
