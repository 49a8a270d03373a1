pub mod media_sharing_repo;

pub use media_sharing_repo::{MediaSharingRepository, RecordQuery};
