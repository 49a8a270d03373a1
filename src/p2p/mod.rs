pub mod dispatch;
pub mod loopback;
pub mod protocols;
pub mod transport;

pub use dispatch::{Dispatcher, InboundOutcome, MessageHandler};
pub use loopback::{InboundFrame, LoopbackNetwork, LoopbackTransport};
pub use transport::{OutboundTransport, TransportError};
