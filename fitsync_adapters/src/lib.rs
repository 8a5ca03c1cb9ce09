pub mod adapter;
pub mod platforms;
pub mod registry;

pub use adapter::{
    FileFormat, ListedActivity, PlatformAdapter, PlatformHealth, PlatformInfo, UploadMetadata,
    UploadOutcome,
};
pub use registry::AdapterRegistry;
