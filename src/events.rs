//! Record lifecycle events
//!
//! Each agent owns its own [`EventBus`]; there is no process-wide instance, so
//! two agents in one process never see each other's events.
//!
//! Delivery is synchronous: `emit` pushes the event into every matching
//! subscriber's unbounded queue before returning, in subscription order.
//! Subscribers only see events emitted after they subscribed.

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use tracing::debug;

use crate::models::{MediaSharingRecord, MediaSharingState};

/// Event discriminant used for subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RecordAdded,
    RecordUpdated,
    RecordDeleted,
    StateChanged,
}

/// Events emitted by the record store and the protocol
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSharingEvent {
    /// A record was persisted for the first time
    RecordAdded {
        record_type: &'static str,
        record: MediaSharingRecord,
    },
    /// An existing record was overwritten
    RecordUpdated {
        record_type: &'static str,
        record: MediaSharingRecord,
        previous_state: MediaSharingState,
    },
    /// A record was removed on application request
    RecordDeleted {
        record_type: &'static str,
        record: MediaSharingRecord,
    },
    /// The protocol moved a record into a new state
    StateChanged {
        record: MediaSharingRecord,
        previous_state: Option<MediaSharingState>,
    },
}

impl MediaSharingEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MediaSharingEvent::RecordAdded { .. } => EventKind::RecordAdded,
            MediaSharingEvent::RecordUpdated { .. } => EventKind::RecordUpdated,
            MediaSharingEvent::RecordDeleted { .. } => EventKind::RecordDeleted,
            MediaSharingEvent::StateChanged { .. } => EventKind::StateChanged,
        }
    }

    pub fn record(&self) -> &MediaSharingRecord {
        match self {
            MediaSharingEvent::RecordAdded { record, .. }
            | MediaSharingEvent::RecordUpdated { record, .. }
            | MediaSharingEvent::RecordDeleted { record, .. }
            | MediaSharingEvent::StateChanged { record, .. } => record,
        }
    }

    pub fn into_record(self) -> MediaSharingRecord {
        match self {
            MediaSharingEvent::RecordAdded { record, .. }
            | MediaSharingEvent::RecordUpdated { record, .. }
            | MediaSharingEvent::RecordDeleted { record, .. }
            | MediaSharingEvent::StateChanged { record, .. } => record,
        }
    }
}

type Predicate = Box<dyn Fn(&MediaSharingEvent) -> bool + Send + Sync>;

struct Subscriber {
    id: u64,
    kind: EventKind,
    predicate: Option<Predicate>,
    tx: UnboundedSender<MediaSharingEvent>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// Publish/subscribe channel for one agent
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver an event to every current subscriber of its kind
    pub fn emit(&self, event: MediaSharingEvent) {
        let kind = event.kind();
        let mut inner = self.lock();

        let mut delivered = 0usize;
        inner.subscribers.retain(|sub| {
            if sub.kind != kind {
                return true;
            }
            if let Some(predicate) = &sub.predicate {
                if !predicate(&event) {
                    return true;
                }
            }
            // A closed receiver means the subscription is gone
            match sub.tx.unbounded_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });

        debug!(
            kind = ?kind,
            record_id = %event.record().id,
            subscribers = delivered,
            "Emitted media sharing event"
        );
    }

    /// Subscribe to every event of one kind
    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        self.add_subscriber(kind, None)
    }

    /// Subscribe to events of one kind that satisfy `predicate`
    pub fn subscribe_filtered<F>(&self, kind: EventKind, predicate: F) -> Subscription
    where
        F: Fn(&MediaSharingEvent) -> bool + Send + Sync + 'static,
    {
        self.add_subscriber(kind, Some(Box::new(predicate)))
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn add_subscriber(&self, kind: EventKind, predicate: Option<Predicate>) -> Subscription {
        let (tx, rx) = unbounded();
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            kind,
            predicate,
            tx,
        });

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
            rx,
        }
    }
}

fn remove_subscriber(bus: &Weak<Mutex<BusInner>>, id: u64) {
    if let Some(inner) = bus.upgrade() {
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.subscribers.retain(|sub| sub.id != id);
    }
}

/// A live subscription. Unsubscribes on [`Subscription::cancel`] or drop.
pub struct Subscription {
    id: u64,
    bus: Weak<Mutex<BusInner>>,
    rx: UnboundedReceiver<MediaSharingEvent>,
}

impl Subscription {
    /// Take the next already-delivered event without waiting
    pub fn try_next_event(&mut self) -> Option<MediaSharingEvent> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving events. Already queued events are discarded.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Stream for Subscription {
    type Item = MediaSharingEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        remove_subscriber(&self.bus, self.id);
    }
}
