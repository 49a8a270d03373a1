pub mod metadata;
pub mod record;

pub use metadata::{Metadata, MetadataValue};
pub use record::{
    items_digest, MediaItem, MediaSharingRecord, MediaSharingRole, MediaSharingState,
    MEDIA_SHARING_RECORD_TYPE,
};
