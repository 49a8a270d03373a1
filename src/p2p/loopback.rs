//! In-process transport between agents
//!
//! Each agent registers an endpoint and gets an inbox of CBOR frames.
//! `connect` creates a pair of connection ids, one per side, the way an
//! out-of-band handshake would on a real network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::protocols::MediaSharingCodec;
use super::transport::{OutboundTransport, TransportError};

/// A frame delivered to an endpoint's inbox
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// Connection id as known by the receiving side
    pub connection_id: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Route {
    local_endpoint: String,
    remote_endpoint: String,
    remote_connection_id: String,
    connected: bool,
}

#[derive(Default)]
struct NetworkInner {
    inboxes: HashMap<String, mpsc::UnboundedSender<InboundFrame>>,
    routes: HashMap<String, Route>,
}

/// Shared switchboard for loopback endpoints
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an endpoint, returning its transport and inbox
    pub fn register_endpoint(
        &self,
        endpoint: impl Into<String>,
    ) -> (LoopbackTransport, mpsc::UnboundedReceiver<InboundFrame>) {
        let endpoint = endpoint.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().inboxes.insert(endpoint.clone(), tx);

        let transport = LoopbackTransport {
            endpoint,
            network: self.clone(),
        };
        (transport, rx)
    }

    /// Connect two registered endpoints.
    ///
    /// Returns `(connection id at a, connection id at b)`.
    pub fn connect(
        &self,
        endpoint_a: &str,
        endpoint_b: &str,
    ) -> std::result::Result<(String, String), TransportError> {
        let mut inner = self.lock();
        for endpoint in [endpoint_a, endpoint_b] {
            if !inner.inboxes.contains_key(endpoint) {
                return Err(TransportError::Other(format!("Unknown endpoint {}", endpoint)));
            }
        }

        let conn_a = uuid::Uuid::new_v4().to_string();
        let conn_b = uuid::Uuid::new_v4().to_string();

        inner.routes.insert(
            conn_a.clone(),
            Route {
                local_endpoint: endpoint_a.to_string(),
                remote_endpoint: endpoint_b.to_string(),
                remote_connection_id: conn_b.clone(),
                connected: true,
            },
        );
        inner.routes.insert(
            conn_b.clone(),
            Route {
                local_endpoint: endpoint_b.to_string(),
                remote_endpoint: endpoint_a.to_string(),
                remote_connection_id: conn_a.clone(),
                connected: true,
            },
        );

        debug!(a = %endpoint_a, b = %endpoint_b, "Loopback connection established");
        Ok((conn_a, conn_b))
    }

    /// Mark both sides of a connection as disconnected
    pub fn disconnect(&self, connection_id: &str) {
        let mut inner = self.lock();
        let remote = match inner.routes.get_mut(connection_id) {
            Some(route) => {
                route.connected = false;
                route.remote_connection_id.clone()
            }
            None => return,
        };
        if let Some(route) = inner.routes.get_mut(&remote) {
            route.connected = false;
        }
    }
}

/// Transport handle for one loopback endpoint
#[derive(Clone)]
pub struct LoopbackTransport {
    endpoint: String,
    network: LoopbackNetwork,
}

impl LoopbackTransport {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn route(&self, connection_id: &str) -> Option<Route> {
        self.network
            .lock()
            .routes
            .get(connection_id)
            .filter(|route| route.local_endpoint == self.endpoint)
            .cloned()
    }
}

#[async_trait]
impl OutboundTransport for LoopbackTransport {
    async fn send(
        &self,
        connection_id: &str,
        payload: serde_json::Value,
    ) -> std::result::Result<(), TransportError> {
        let route = self
            .route(connection_id)
            .ok_or_else(|| TransportError::UnknownConnection(connection_id.to_string()))?;

        if !route.connected {
            return Err(TransportError::NotConnected(connection_id.to_string()));
        }

        let bytes = MediaSharingCodec::encode_cbor(&payload)
            .map_err(|e| TransportError::Other(e.to_string()))?;

        let inbox = self
            .network
            .lock()
            .inboxes
            .get(&route.remote_endpoint)
            .cloned()
            .ok_or(TransportError::Closed)?;

        inbox
            .send(InboundFrame {
                connection_id: route.remote_connection_id.clone(),
                bytes,
            })
            .map_err(|_| {
                warn!(endpoint = %route.remote_endpoint, "Loopback inbox closed");
                TransportError::Closed
            })?;

        debug!(
            from = %self.endpoint,
            to = %route.remote_endpoint,
            connection_id = %connection_id,
            "Loopback frame sent"
        );
        Ok(())
    }

    fn is_connected(&self, connection_id: &str) -> bool {
        self.route(connection_id)
            .map(|route| route.connected)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_frames_arrive_with_remote_connection_id() {
        let network = LoopbackNetwork::new();
        let (alice, _alice_inbox) = network.register_endpoint("alice");
        let (_bob, mut bob_inbox) = network.register_endpoint("bob");
        let (alice_conn, bob_conn) = network.connect("alice", "bob").unwrap();

        assert!(alice.is_connected(&alice_conn));
        alice.send(&alice_conn, json!({ "type": "x" })).await.unwrap();

        let frame = bob_inbox.recv().await.unwrap();
        assert_eq!(frame.connection_id, bob_conn);
        assert_eq!(
            MediaSharingCodec::decode_cbor(&frame.bytes).unwrap(),
            json!({ "type": "x" })
        );
    }

    #[tokio::test]
    async fn test_send_fails_on_unknown_or_disconnected() {
        let network = LoopbackNetwork::new();
        let (alice, _alice_inbox) = network.register_endpoint("alice");
        let (bob, _bob_inbox) = network.register_endpoint("bob");
        let (alice_conn, bob_conn) = network.connect("alice", "bob").unwrap();

        // Bob's connection id is not usable from Alice's endpoint
        assert_eq!(
            alice.send(&bob_conn, json!({})).await,
            Err(TransportError::UnknownConnection(bob_conn.clone()))
        );

        network.disconnect(&alice_conn);
        assert!(!alice.is_connected(&alice_conn));
        assert!(!bob.is_connected(&bob_conn));
        assert_eq!(
            alice.send(&alice_conn, json!({})).await,
            Err(TransportError::NotConnected(alice_conn.clone()))
        );
    }

    #[tokio::test]
    async fn test_send_fails_when_inbox_dropped() {
        let network = LoopbackNetwork::new();
        let (alice, _alice_inbox) = network.register_endpoint("alice");
        let (_bob, bob_inbox) = network.register_endpoint("bob");
        let (alice_conn, _) = network.connect("alice", "bob").unwrap();

        drop(bob_inbox);
        assert_eq!(
            alice.send(&alice_conn, json!({})).await,
            Err(TransportError::Closed)
        );
    }

    #[test]
    fn test_connect_unknown_endpoint() {
        let network = LoopbackNetwork::new();
        let _alice = network.register_endpoint("alice");
        assert!(network.connect("alice", "carol").is_err());
    }
}
