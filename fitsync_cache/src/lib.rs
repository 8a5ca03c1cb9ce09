pub mod cache;
pub mod transcoder;

pub use cache::FileCache;
pub use transcoder::{BestEffortTranscoder, Transcoder};
