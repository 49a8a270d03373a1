pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod module;
pub mod p2p;
pub mod services;

pub use agent::MediaAgent;
pub use config::{AgentConfig, DatabaseLocation};
pub use error::{MediaSharingError, Result};
pub use events::{EventBus, EventKind, MediaSharingEvent, Subscription};
pub use logging::{init_logging, LogConfig};
pub use models::{
    MediaItem, MediaSharingRecord, MediaSharingRole, MediaSharingState, Metadata, MetadataValue,
};
pub use module::{CreateMediaSharingOptions, MediaSharingModule, ShareMediaOptions};
pub use p2p::{
    Dispatcher, InboundFrame, InboundOutcome, LoopbackNetwork, LoopbackTransport, MessageHandler,
    OutboundTransport, TransportError,
};
