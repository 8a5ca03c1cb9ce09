//! The Platform Adapter Interface (spec §4.6) — the sole polymorphic
//! boundary in FitSync (spec §9 "Polymorphism"). Adding a platform means
//! implementing this trait and registering it; nothing else in the
//! executor changes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fitsync_core::error::SyncError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Fit,
    Tcx,
    Gpx,
}

impl FileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Fit => "fit",
            Self::Tcx => "tcx",
            Self::Gpx => "gpx",
        }
    }

    /// FIT > TCX > GPX, the default transfer-format preference (spec §4.9
    /// step 5), used unless a direction configures an override.
    pub fn default_preference_rank(self) -> u8 {
        match self {
            Self::Fit => 0,
            Self::Tcx => 1,
            Self::Gpx => 2,
        }
    }
}

/// An activity as reported by a source platform's list call, before the
/// core has computed its fingerprint or normalized its sport type. The
/// executor owns that translation (spec §4.1/§4.9 step 3).
#[derive(Debug, Clone)]
pub struct ListedActivity {
    pub platform_activity_id: String,
    pub name: String,
    /// Platform-native sport-type string, normalized by the core via
    /// [`fitsync_core::sport::normalize`].
    pub raw_sport_type: String,
    pub start_time: DateTime<Utc>,
    pub distance_m: f64,
    pub duration_s: i64,
    pub elevation_gain_m: Option<f64>,
    pub available_formats: Vec<FileFormat>,
    /// Created in the platform's UI with no device upload: no original
    /// file exists (spec §4.7).
    pub is_manual: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Accepted { remote_id: String },
    Duplicate,
    Rejected { reason: String },
    TransientError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformHealth {
    Ok,
    Degraded,
    Down,
}

#[derive(Debug, Clone)]
pub struct PlatformInfo {
    pub platform_name: &'static str,
    pub api_cost_per_list: i64,
    pub api_cost_per_download: i64,
    pub api_cost_per_upload: i64,
}

/// Metadata the adapter needs to build an upload request. Distinct from
/// [`fitsync_core::ActivityRecord`] so the adapter layer never has to
/// depend on a fingerprint having already been computed.
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub name: String,
    pub raw_sport_type: String,
    pub start_time: DateTime<Utc>,
    pub distance_m: f64,
    pub duration_s: i64,
    pub elevation_gain_m: Option<f64>,
}

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Newest-first or chronological; the executor sorts ascending by
    /// `start_time` regardless (spec §2 data flow, §5 ordering
    /// guarantees).
    async fn list_activities(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ListedActivity>, SyncError>;

    async fn download(
        &self,
        platform_activity_id: &str,
        preferred_format: FileFormat,
    ) -> Result<(Vec<u8>, FileFormat), SyncError>;

    async fn upload(
        &self,
        bytes: &[u8],
        format: FileFormat,
        metadata: &UploadMetadata,
    ) -> Result<UploadOutcome, SyncError>;

    fn supported_upload_formats(&self) -> Vec<FileFormat>;

    fn info(&self) -> PlatformInfo;

    async fn health_check(&self) -> PlatformHealth;
}
