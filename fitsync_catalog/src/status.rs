use std::fmt;

use crate::error::CatalogError;

/// `(fingerprint, source_platform, destination_platform) -> status`
/// (spec §3). `Synced` and `Duplicate` are terminal-success; `Skipped`
/// and `Failed` carry a reason string for operator-visible summaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatusValue {
    Pending,
    Synced,
    Skipped(String),
    Failed(String),
    Duplicate,
}

impl SyncStatusValue {
    /// The bare status tag, as stored in `sync_status.status`.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
            Self::Duplicate => "duplicate",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Skipped(r) | Self::Failed(r) => Some(r.as_str()),
            _ => None,
        }
    }

    /// `synced` and `duplicate` are terminal and must never regress to
    /// `pending` on retry (spec §4.4).
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, Self::Synced | Self::Duplicate)
    }

    pub fn from_row(tag: &str, reason: Option<String>) -> Result<Self, CatalogError> {
        Ok(match tag {
            "pending" => Self::Pending,
            "synced" => Self::Synced,
            "duplicate" => Self::Duplicate,
            "skipped" => Self::Skipped(reason.unwrap_or_default()),
            "failed" => Self::Failed(reason.unwrap_or_default()),
            other => {
                return Err(CatalogError::MalformedRow(format!(
                    "unknown sync_status tag {other}"
                )))
            }
        })
    }
}

impl fmt::Display for SyncStatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}({reason})", self.tag()),
            None => f.write_str(self.tag()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_success_flags() {
        assert!(SyncStatusValue::Synced.is_terminal_success());
        assert!(SyncStatusValue::Duplicate.is_terminal_success());
        assert!(!SyncStatusValue::Pending.is_terminal_success());
        assert!(!SyncStatusValue::Failed("x".into()).is_terminal_success());
    }

    #[test]
    fn round_trips_through_row_representation() {
        let original = SyncStatusValue::Skipped("no_source_file".to_string());
        let restored =
            SyncStatusValue::from_row(original.tag(), original.reason().map(String::from))
                .unwrap();
        assert_eq!(original, restored);
    }
}
