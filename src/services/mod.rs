pub mod keyed_lock;
pub mod media_sharing_service;
pub mod record_store;
pub mod state_machine;

pub use keyed_lock::KeyedLocks;
pub use media_sharing_service::MediaSharingService;
pub use record_store::MediaSharingRecordStore;
pub use state_machine::{transition, Effect, ProtocolAction, Transition};
