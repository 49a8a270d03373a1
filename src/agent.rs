//! One media sharing participant: storage, events, module and inbound dispatch

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, DatabaseLocation};
use crate::db::Database;
use crate::error::Result;
use crate::events::EventBus;
use crate::logging::init_logging;
use crate::module::MediaSharingModule;
use crate::p2p::dispatch::{Dispatcher, InboundOutcome};
use crate::p2p::loopback::InboundFrame;
use crate::p2p::protocols::MediaSharingCodec;
use crate::p2p::transport::OutboundTransport;
use crate::services::{MediaSharingRecordStore, MediaSharingService};

pub struct MediaAgent {
    label: String,
    events: EventBus,
    media: MediaSharingModule,
    dispatcher: Dispatcher,
}

impl MediaAgent {
    /// Build an agent with its own database and event bus.
    ///
    /// Fails if the database cannot be opened or a message kind is left
    /// without a handler.
    pub fn new(config: AgentConfig, transport: Arc<dyn OutboundTransport>) -> Result<Self> {
        if let Some(log) = config.log.clone() {
            if let Err(e) = init_logging(log) {
                warn!(agent = %config.label, error = %e, "Keeping existing logging setup");
            }
        }

        let db = match &config.database {
            DatabaseLocation::InMemory => Database::in_memory()?,
            DatabaseLocation::File(path) => Database::new(path.clone())?,
        };

        let events = EventBus::new();
        let store = Arc::new(MediaSharingRecordStore::new(Arc::new(db), events.clone()));
        let service = Arc::new(MediaSharingService::new(store, transport));
        let media = MediaSharingModule::new(service);

        let mut dispatcher = Dispatcher::new();
        media.register_handlers(&mut dispatcher)?;
        dispatcher.ensure_complete()?;

        info!(agent = %config.label, database = ?config.database, "Media agent ready");
        Ok(Self {
            label: config.label,
            events,
            media,
            dispatcher,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn media(&self) -> &MediaSharingModule {
        &self.media
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Handle a decrypted inbound envelope
    pub async fn receive(
        &self,
        connection_id: &str,
        payload: &serde_json::Value,
    ) -> Result<InboundOutcome> {
        self.dispatcher.dispatch(connection_id, payload).await
    }

    /// Handle an inbound CBOR frame
    pub async fn receive_frame(&self, connection_id: &str, bytes: &[u8]) -> Result<InboundOutcome> {
        let payload = MediaSharingCodec::decode_cbor(bytes).map_err(|e| {
            warn!(agent = %self.label, connection_id = %connection_id, error = %e, "Dropping undecodable frame");
            e
        })?;
        self.receive(connection_id, &payload).await
    }

    /// Drain an inbox on a background task until its sender side closes.
    ///
    /// Failures are logged and the frame dropped; the task keeps running.
    pub fn spawn_inbound(
        self: &Arc<Self>,
        mut inbox: mpsc::UnboundedReceiver<InboundFrame>,
    ) -> JoinHandle<()> {
        let agent = self.clone();
        tokio::spawn(async move {
            while let Some(frame) = inbox.recv().await {
                match agent.receive_frame(&frame.connection_id, &frame.bytes).await {
                    Ok(outcome) => debug!(
                        agent = %agent.label,
                        record_id = %outcome.record_id(),
                        "Inbound frame handled"
                    ),
                    Err(e) => debug!(agent = %agent.label, error = %e, "Inbound frame dropped"),
                }
            }
            debug!(agent = %agent.label, "Inbox closed");
        })
    }
}
