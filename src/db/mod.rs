pub mod connection;
pub mod repositories;
pub mod sql_utils;

pub use connection::Database;
pub use repositories::{MediaSharingRepository, RecordQuery};
