pub mod cache_image;
pub mod enrich;

pub use cache_image::CacheImageJobHandler;
pub use enrich::EnrichJobHandler;
