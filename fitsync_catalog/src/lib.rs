pub mod error;
pub mod models;
pub mod status;
pub mod store;

pub use error::CatalogError;
pub use models::{ApiCounters, CacheEntry, PlatformMapping};
pub use status::SyncStatusValue;
pub use store::CatalogStore;
