pub mod media_sharing;

pub use media_sharing::*;
