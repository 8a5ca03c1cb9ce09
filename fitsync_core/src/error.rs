use std::time::Duration;

use thiserror::Error;

/// The tagged error kinds propagated between adapters, the cache, the
/// governor, and the sync executor (spec §7). Each variant carries the
/// policy its origin expects downstream: some are terminal for a single
/// activity, some halt a whole direction, and `CatalogCorruption` halts
/// the entire invocation.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("unauthorized against {platform}")]
    Unauthorized { platform: String },

    #[error("rate limited on {platform}, retry after {retry_after:?}")]
    RateLimited {
        platform: String,
        retry_after: Duration,
    },

    #[error("no original file available for this activity")]
    NoOriginalFile,

    #[error("activity not found on {platform}")]
    NotFound { platform: String },

    #[error("transport error talking to {platform}: {message}")]
    Transport { platform: String, message: String },

    #[error("activity metadata failed validation: {0}")]
    Validation(String),

    #[error("destination reported duplicate")]
    Duplicate,

    #[error("catalog corruption detected: {0}")]
    CatalogCorruption(String),

    #[error("format conversion from {from} to {to} is not supported")]
    UnsupportedConversion { from: String, to: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// True for errors that are local to the one activity being processed
    /// and must not abort the enclosing direction (spec §7 propagation policy).
    pub fn is_activity_local(&self) -> bool {
        matches!(
            self,
            Self::NoOriginalFile
                | Self::NotFound { .. }
                | Self::Transport { .. }
                | Self::Validation(_)
                | Self::Duplicate
                | Self::UnsupportedConversion { .. }
        )
    }

    /// True for errors that halt the current direction but leave the
    /// process, and any remaining enabled directions, running.
    pub fn is_direction_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::RateLimited { .. })
    }

    /// True only for `CatalogCorruption`, the sole error that aborts the
    /// entire invocation per spec §7.
    pub fn is_invocation_fatal(&self) -> bool {
        matches!(self, Self::CatalogCorruption(_))
    }
}
