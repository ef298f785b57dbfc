pub mod cache;
pub mod reader;
pub mod types;

pub use cache::MetadataCache;
pub use types::{exposure_key, format_exposure, FrameType, ImageMetadata};
