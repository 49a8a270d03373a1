//! Media sharing protocol service
//!
//! Runs the state machine for both sides of an exchange: creating and sharing
//! records on the sender, materializing records from inbound share messages on
//! the receiver.

use std::sync::Arc;
use tracing::{info, warn};

use super::keyed_lock::KeyedLocks;
use super::record_store::{MediaSharingRecordStore, RecordLock};
use super::state_machine::{transition, Effect, ProtocolAction, Transition};
use crate::error::{MediaSharingError, Result};
use crate::events::{EventBus, MediaSharingEvent};
use crate::models::{items_digest, MediaItem, MediaSharingRecord, MediaSharingState, Metadata};
use crate::p2p::dispatch::InboundOutcome;
use crate::p2p::protocols::{MediaSharingCodec, ShareMediaMessage};
use crate::p2p::transport::OutboundTransport;

/// Service driving the media sharing protocol for one agent
pub struct MediaSharingService {
    store: Arc<MediaSharingRecordStore>,
    transport: Arc<dyn OutboundTransport>,
    events: EventBus,
    /// Serializes inbound handling per connection and thread
    thread_locks: KeyedLocks,
}

impl MediaSharingService {
    pub fn new(store: Arc<MediaSharingRecordStore>, transport: Arc<dyn OutboundTransport>) -> Self {
        let events = store.events().clone();
        Self {
            store,
            transport,
            events,
            thread_locks: KeyedLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<MediaSharingRecordStore> {
        &self.store
    }

    /// Create a sender-side record in `Created` state. Nothing is sent.
    pub async fn create_record(
        &self,
        connection_id: &str,
        metadata: Metadata,
        description: Option<String>,
    ) -> Result<MediaSharingRecord> {
        if connection_id.trim().is_empty() {
            return Err(MediaSharingError::Validation(
                "connectionId must not be empty".to_string(),
            ));
        }

        let record = MediaSharingRecord::new_sender(connection_id, metadata, description);
        let step = transition(&record.id, None, ProtocolAction::Create)?;
        self.apply(&step, &record, None, None).await?;

        info!(
            record_id = %record.id,
            connection_id = %connection_id,
            "Created media sharing record"
        );
        Ok(record)
    }

    /// Share items on a `Created` record.
    ///
    /// The record is persisted as `MediaShared` only after the transport has
    /// accepted the message; on send failure it stays `Created`.
    pub async fn share_items(
        &self,
        record_id: &str,
        items: Vec<MediaItem>,
    ) -> Result<MediaSharingRecord> {
        if items.is_empty() {
            return Err(MediaSharingError::Validation(
                "At least one media item is required".to_string(),
            ));
        }
        for item in &items {
            item.validate()?;
        }

        // Held across send and persist so a concurrent delete waits for the share
        let lock = self.store.lock_record(record_id).await;

        let current = self
            .store
            .find_by_id(record_id)?
            .ok_or_else(|| MediaSharingError::RecordNotFound(record_id.to_string()))?;
        let step = transition(record_id, Some(current.state), ProtocolAction::Share)?;

        let mut record = current;
        let thread_id = record
            .thread_id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        record.items = items;
        record.state = step.to;
        record.updated_at = chrono::Utc::now().timestamp();

        let message = ShareMediaMessage::new(thread_id.clone(), record.items.clone())
            .with_description(record.description.clone());
        self.apply(&step, &record, Some(&message), Some(&lock)).await?;

        info!(
            record_id = %record.id,
            connection_id = %record.connection_id,
            thread_id = %thread_id,
            items = record.items.len(),
            "Shared media items"
        );
        Ok(record)
    }

    /// Decode an inbound envelope and handle it as a share
    pub async fn handle_inbound_payload(
        &self,
        connection_id: &str,
        payload: &serde_json::Value,
    ) -> Result<InboundOutcome> {
        let message = MediaSharingCodec::decode(payload)?;
        self.handle_inbound_share(connection_id, message).await
    }

    /// Materialize a receiver-side record from a share message.
    ///
    /// Re-delivery of an identical message for the same connection and thread
    /// is a no-op. A different item list on an existing thread is rejected.
    pub async fn handle_inbound_share(
        &self,
        connection_id: &str,
        message: ShareMediaMessage,
    ) -> Result<InboundOutcome> {
        let _guard = self
            .thread_locks
            .lock(&format!("thread:{}:{}", connection_id, message.thread_id))
            .await;

        if let Some(existing) = self
            .store
            .find_by_connection_and_thread(connection_id, &message.thread_id)?
        {
            let incoming = items_digest(&message.items)?;
            if existing.state == MediaSharingState::MediaShared
                && existing.items_digest()? == incoming
            {
                info!(
                    record_id = %existing.id,
                    thread_id = %message.thread_id,
                    "Ignoring duplicate share delivery"
                );
                return Ok(InboundOutcome::Duplicate {
                    record_id: existing.id,
                });
            }

            warn!(
                record_id = %existing.id,
                thread_id = %message.thread_id,
                state = %existing.state,
                "Rejecting conflicting share on existing thread"
            );
            return Err(MediaSharingError::InvalidState {
                record_id: existing.id,
                state: existing.state,
                action: ProtocolAction::Receive.as_str(),
            });
        }

        let record = MediaSharingRecord::new_receiver(
            connection_id,
            message.thread_id.clone(),
            message.items,
            message.description,
        );
        let step = transition(&record.id, None, ProtocolAction::Receive)?;
        self.apply(&step, &record, None, None).await?;

        info!(
            record_id = %record.id,
            connection_id = %connection_id,
            thread_id = %message.thread_id,
            items = record.items.len(),
            "Received shared media"
        );
        Ok(InboundOutcome::Created {
            record_id: record.id,
        })
    }

    async fn apply(
        &self,
        step: &Transition,
        record: &MediaSharingRecord,
        message: Option<&ShareMediaMessage>,
        lock: Option<&RecordLock>,
    ) -> Result<()> {
        for effect in step.effects {
            match effect {
                Effect::SendMessage => {
                    let message = message.ok_or_else(|| {
                        MediaSharingError::Internal("Send effect without a message".to_string())
                    })?;
                    self.send(&record.connection_id, message).await?;
                }
                Effect::PersistNew => self.store.create(record).await?,
                Effect::PersistUpdate => match lock {
                    Some(lock) => self.store.update_locked(lock, record)?,
                    None => self.store.update(record).await?,
                },
                Effect::EmitStateChanged => self.events.emit(MediaSharingEvent::StateChanged {
                    record: record.clone(),
                    previous_state: step.from,
                }),
            }
        }
        Ok(())
    }

    async fn send(&self, connection_id: &str, message: &ShareMediaMessage) -> Result<()> {
        if !self.transport.is_connected(connection_id) {
            return Err(MediaSharingError::SendFailure {
                connection_id: connection_id.to_string(),
                reason: "connection is not connected".to_string(),
            });
        }

        let payload = MediaSharingCodec::encode(message)?;
        self.transport
            .send(connection_id, payload)
            .await
            .map_err(|e| {
                warn!(connection_id = %connection_id, error = %e, "Outbound send failed");
                MediaSharingError::SendFailure {
                    connection_id: connection_id.to_string(),
                    reason: e.to_string(),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::events::EventKind;
    use crate::p2p::transport::TransportError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records sent payloads; can be switched to fail
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, serde_json::Value)>>,
        fail: Mutex<bool>,
        disconnected: Mutex<bool>,
        delay_ms: AtomicU64,
    }

    #[async_trait]
    impl OutboundTransport for RecordingTransport {
        async fn send(
            &self,
            connection_id: &str,
            payload: serde_json::Value,
        ) -> std::result::Result<(), TransportError> {
            let delay = self.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if *self.fail.lock().unwrap() {
                return Err(TransportError::Other("boom".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((connection_id.to_string(), payload));
            Ok(())
        }

        fn is_connected(&self, _connection_id: &str) -> bool {
            !*self.disconnected.lock().unwrap()
        }
    }

    fn service() -> (MediaSharingService, Arc<RecordingTransport>) {
        let store = Arc::new(MediaSharingRecordStore::new(
            Arc::new(Database::in_memory().unwrap()),
            EventBus::new(),
        ));
        let transport = Arc::new(RecordingTransport::default());
        (MediaSharingService::new(store, transport.clone()), transport)
    }

    fn png(uri: &str) -> MediaItem {
        MediaItem::new("image/png", uri)
    }

    #[tokio::test]
    async fn test_create_record() {
        let (service, transport) = service();
        let mut changed = service.store().events().subscribe(EventKind::StateChanged);

        let record = service
            .create_record("conn-1", Metadata::new().with("k", "v"), None)
            .await
            .unwrap();

        assert_eq!(record.state, MediaSharingState::Created);
        assert!(record.items.is_empty());
        assert_eq!(record.metadata.get("k").and_then(|v| v.as_str()), Some("v"));
        assert!(transport.sent.lock().unwrap().is_empty());

        match changed.try_next_event() {
            Some(MediaSharingEvent::StateChanged { previous_state, record: snap }) => {
                assert_eq!(previous_state, None);
                assert_eq!(snap.state, MediaSharingState::Created);
            }
            other => panic!("Expected StateChanged, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_requires_connection_id() {
        let (service, _) = service();
        assert!(matches!(
            service.create_record("", Metadata::new(), None).await,
            Err(MediaSharingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_share_sends_and_persists() {
        let (service, transport) = service();
        let record = service
            .create_record("conn-1", Metadata::new().with("local", true), Some("trip".into()))
            .await
            .unwrap();

        let shared = service
            .share_items(&record.id, vec![png("http://1"), png("http://2")])
            .await
            .unwrap();
        assert_eq!(shared.state, MediaSharingState::MediaShared);
        let thread_id = shared.thread_id.clone().unwrap();

        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "conn-1");
        let message = MediaSharingCodec::decode(&sent[0].1).unwrap();
        assert_eq!(message.thread_id, thread_id);
        assert_eq!(message.items, shared.items);
        assert_eq!(message.description.as_deref(), Some("trip"));
        // Record-level metadata stays local
        assert!(sent[0].1.get("metadata").is_none());

        let stored = service.store().get_by_id(&record.id).unwrap();
        assert_eq!(stored, shared);
    }

    #[tokio::test]
    async fn test_share_twice_fails_and_keeps_first_items() {
        let (service, transport) = service();
        let record = service
            .create_record("conn-1", Metadata::new(), None)
            .await
            .unwrap();
        service
            .share_items(&record.id, vec![png("http://first")])
            .await
            .unwrap();

        let err = service
            .share_items(&record.id, vec![png("http://second")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MediaSharingError::InvalidState { state: MediaSharingState::MediaShared, .. }
        ));

        let stored = service.store().get_by_id(&record.id).unwrap();
        assert_eq!(stored.items, vec![png("http://first")]);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_share_unknown_record() {
        let (service, _) = service();
        assert!(matches!(
            service.share_items("missing", vec![png("http://x")]).await,
            Err(MediaSharingError::RecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_share_rejects_empty_or_invalid_items() {
        let (service, _) = service();
        let record = service
            .create_record("conn-1", Metadata::new(), None)
            .await
            .unwrap();

        assert!(matches!(
            service.share_items(&record.id, vec![]).await,
            Err(MediaSharingError::Validation(_))
        ));
        assert!(matches!(
            service.share_items(&record.id, vec![png("")]).await,
            Err(MediaSharingError::Validation(_))
        ));
        assert_eq!(
            service.store().get_by_id(&record.id).unwrap().state,
            MediaSharingState::Created
        );
    }

    #[tokio::test]
    async fn test_failed_send_leaves_record_created() {
        let (service, transport) = service();
        let record = service
            .create_record("conn-1", Metadata::new(), None)
            .await
            .unwrap();
        let mut updated = service.store().events().subscribe(EventKind::RecordUpdated);

        *transport.fail.lock().unwrap() = true;
        let err = service
            .share_items(&record.id, vec![png("http://x")])
            .await
            .unwrap_err();
        assert!(matches!(err, MediaSharingError::SendFailure { .. }));

        let stored = service.store().get_by_id(&record.id).unwrap();
        assert_eq!(stored.state, MediaSharingState::Created);
        assert!(stored.items.is_empty());
        assert!(stored.thread_id.is_none());
        assert!(updated.try_next_event().is_none());

        // A later attempt can still succeed
        *transport.fail.lock().unwrap() = false;
        let shared = service
            .share_items(&record.id, vec![png("http://x")])
            .await
            .unwrap();
        assert_eq!(shared.state, MediaSharingState::MediaShared);
    }

    #[tokio::test]
    async fn test_share_to_disconnected_peer() {
        let (service, transport) = service();
        let record = service
            .create_record("conn-1", Metadata::new(), None)
            .await
            .unwrap();

        *transport.disconnected.lock().unwrap() = true;
        assert!(matches!(
            service.share_items(&record.id, vec![png("http://x")]).await,
            Err(MediaSharingError::SendFailure { .. })
        ));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_shares_only_one_wins() {
        let (service, transport) = service();
        let service = Arc::new(service);
        let record = service
            .create_record("conn-1", Metadata::new(), None)
            .await
            .unwrap();

        let a = {
            let service = service.clone();
            let id = record.id.clone();
            tokio::spawn(async move { service.share_items(&id, vec![png("http://a")]).await })
        };
        let b = {
            let service = service.clone();
            let id = record.id.clone();
            tokio::spawn(async move { service.share_items(&id, vec![png("http://b")]).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inbound_share_creates_receiver_record() {
        let (service, _) = service();
        let mut added = service.store().events().subscribe(EventKind::RecordAdded);

        let message = ShareMediaMessage::new("thread-1", vec![png("http://x")]);
        let outcome = service
            .handle_inbound_share("conn-9", message)
            .await
            .unwrap();

        let record = service.store().get_by_id(outcome.record_id()).unwrap();
        assert!(matches!(outcome, InboundOutcome::Created { .. }));
        assert_eq!(record.state, MediaSharingState::MediaShared);
        assert_eq!(record.connection_id, "conn-9");
        assert_eq!(record.thread_id.as_deref(), Some("thread-1"));
        assert!(record.metadata.is_empty());

        assert_eq!(added.try_next_event().unwrap().record().id, record.id);
        assert!(added.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_a_noop() {
        let (service, _) = service();
        let message = ShareMediaMessage::new("thread-1", vec![png("http://x")]);
        let first = service
            .handle_inbound_share("conn-9", message.clone())
            .await
            .unwrap();

        let mut added = service.store().events().subscribe(EventKind::RecordAdded);
        let second = service
            .handle_inbound_share("conn-9", message)
            .await
            .unwrap();

        assert_eq!(
            second,
            InboundOutcome::Duplicate {
                record_id: first.record_id().to_string()
            }
        );
        assert!(added.try_next_event().is_none());
        assert_eq!(service.store().get_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_items_on_same_thread_rejected() {
        let (service, _) = service();
        service
            .handle_inbound_share("conn-9", ShareMediaMessage::new("thread-1", vec![png("http://x")]))
            .await
            .unwrap();

        let err = service
            .handle_inbound_share("conn-9", ShareMediaMessage::new("thread-1", vec![png("http://y")]))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaSharingError::InvalidState { .. }));
        assert_eq!(service.store().get_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_thread_on_other_connection_is_separate() {
        let (service, _) = service();
        let message = ShareMediaMessage::new("thread-1", vec![png("http://x")]);
        service
            .handle_inbound_share("conn-1", message.clone())
            .await
            .unwrap();
        let outcome = service.handle_inbound_share("conn-2", message).await.unwrap();

        assert!(matches!(outcome, InboundOutcome::Created { .. }));
        assert_eq!(service.store().get_all().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_payload_creates_nothing() {
        let (service, _) = service();
        let payload = serde_json::json!({
            "type": "media-sharing/1.0/share-media",
            "threadId": "thread-1",
            "items": [{ "mimeType": "image/png" }]
        });

        assert!(matches!(
            service.handle_inbound_payload("conn-1", &payload).await,
            Err(MediaSharingError::MalformedMessage(_))
        ));
        assert!(service.store().get_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_during_share_waits_for_it() {
        let (service, transport) = service();
        let service = Arc::new(service);
        let record = service
            .create_record("conn-1", Metadata::new(), None)
            .await
            .unwrap();
        let mut deleted = service.store().events().subscribe(EventKind::RecordDeleted);

        transport.delay_ms.store(50, Ordering::SeqCst);
        let sharing = {
            let service = service.clone();
            let id = record.id.clone();
            tokio::spawn(async move { service.share_items(&id, vec![png("http://x")]).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        service.store().delete_by_id(&record.id).await.unwrap();
        let shared = sharing.await.unwrap().unwrap();

        assert_eq!(shared.state, MediaSharingState::MediaShared);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
        // The delete ran after the share was persisted
        let gone = deleted.try_next_event().unwrap().into_record();
        assert_eq!(gone.state, MediaSharingState::MediaShared);
        assert!(service.store().find_by_id(&record.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_identical_deliveries_create_one_record() {
        let (service, _) = service();
        let service = Arc::new(service);
        let mut added = service.store().events().subscribe(EventKind::RecordAdded);
        let message = ShareMediaMessage::new("thread-1", vec![png("http://x"), png("http://y")]);

        let deliveries: Vec<_> = (0..2)
            .map(|_| {
                let service = service.clone();
                let message = message.clone();
                tokio::spawn(async move { service.handle_inbound_share("conn-9", message).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for delivery in deliveries {
            outcomes.push(delivery.await.unwrap().unwrap());
        }

        let created = outcomes
            .iter()
            .filter(|o| matches!(o, InboundOutcome::Created { .. }))
            .count();
        let duplicates = outcomes
            .iter()
            .filter(|o| matches!(o, InboundOutcome::Duplicate { .. }))
            .count();
        assert_eq!((created, duplicates), (1, 1));
        assert_eq!(outcomes[0].record_id(), outcomes[1].record_id());

        assert_eq!(service.store().get_all().unwrap().len(), 1);
        assert!(added.try_next_event().is_some());
        assert!(added.try_next_event().is_none());
    }
}
