//! Inbound message dispatch
//!
//! Handlers are registered per [`MessageKind`] and the registry is checked for
//! completeness when an agent starts, so an unhandled kind is a startup error
//! rather than a dropped message at runtime.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::protocols::{message_type_of, MessageKind};
use crate::error::{MediaSharingError, Result};

/// Result of handling one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// A new record was materialized
    Created { record_id: String },
    /// Re-delivery of an exchange that is already recorded
    Duplicate { record_id: String },
}

impl InboundOutcome {
    pub fn record_id(&self) -> &str {
        match self {
            InboundOutcome::Created { record_id } | InboundOutcome::Duplicate { record_id } => {
                record_id
            }
        }
    }
}

/// Handler for one message kind
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn kind(&self) -> MessageKind;

    /// Handle a decrypted envelope received on `connection_id`
    async fn handle(&self, connection_id: &str, payload: &serde_json::Value)
        -> Result<InboundOutcome>;
}

/// Registry routing inbound envelopes to handlers by message type
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<MessageKind, Arc<dyn MessageHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; each kind may only be registered once
    pub fn register(&mut self, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let kind = handler.kind();
        if self.handlers.contains_key(&kind) {
            return Err(MediaSharingError::Validation(format!(
                "Handler already registered for {}",
                kind
            )));
        }

        debug!(message_type = %kind, "Registered message handler");
        self.handlers.insert(kind, handler);
        Ok(())
    }

    pub fn is_registered(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Fail if any known message kind has no handler
    pub fn ensure_complete(&self) -> Result<()> {
        match MessageKind::ALL.iter().find(|kind| !self.is_registered(**kind)) {
            Some(missing) => Err(MediaSharingError::MissingHandler(missing.to_string())),
            None => Ok(()),
        }
    }

    /// Route an inbound envelope to its handler.
    ///
    /// Never panics on bad input: malformed or unknown messages are logged,
    /// dropped, and reported through the returned error.
    pub async fn dispatch(
        &self,
        connection_id: &str,
        payload: &serde_json::Value,
    ) -> Result<InboundOutcome> {
        let message_type = match message_type_of(payload) {
            Some(t) => t,
            None => {
                warn!(connection_id = %connection_id, "Dropping inbound message without type");
                return Err(MediaSharingError::MalformedMessage(
                    "Missing message type".to_string(),
                ));
            }
        };

        let handler = match MessageKind::from_type_str(message_type)
            .and_then(|kind| self.handlers.get(&kind))
        {
            Some(handler) => handler,
            None => {
                warn!(
                    connection_id = %connection_id,
                    message_type = %message_type,
                    "Dropping inbound message of unsupported type"
                );
                return Err(MediaSharingError::UnsupportedMessageType(
                    message_type.to_string(),
                ));
            }
        };

        match handler.handle(connection_id, payload).await {
            Ok(outcome) => Ok(outcome),
            Err(e @ MediaSharingError::MalformedMessage(_)) => {
                warn!(
                    connection_id = %connection_id,
                    message_type = %message_type,
                    error = %e,
                    "Dropping malformed inbound message"
                );
                Err(e)
            }
            Err(e) => {
                error!(
                    connection_id = %connection_id,
                    message_type = %message_type,
                    error = %e,
                    "Failed to handle inbound message"
                );
                Err(e)
            }
        }
    }
}
