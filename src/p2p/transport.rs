//! Outbound transport collaborator
//!
//! Connection management, encryption and delivery live outside this crate.
//! The protocol only needs to hand a message to the host for a connection.

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by the host transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection {0} is not connected")]
    NotConnected(String),

    #[error("Unknown connection {0}")]
    UnknownConnection(String),

    #[error("Transport closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// Hands encoded protocol messages to the host for delivery
#[async_trait]
pub trait OutboundTransport: Send + Sync {
    /// Queue `payload` for the peer behind `connection_id`.
    ///
    /// Returns once the host has accepted the message, not when the peer
    /// has received it.
    async fn send(
        &self,
        connection_id: &str,
        payload: serde_json::Value,
    ) -> std::result::Result<(), TransportError>;

    /// Whether the connection is currently usable
    fn is_connected(&self, _connection_id: &str) -> bool {
        true
    }
}
