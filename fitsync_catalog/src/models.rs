use chrono::{DateTime, Utc};

/// `(fingerprint, platform) -> platform_activity_id` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformMapping {
    pub fingerprint: String,
    pub platform: String,
    pub platform_activity_id: String,
    pub created_at: DateTime<Utc>,
}

/// `(fingerprint, file_format) -> (file_path, size_bytes, created_at)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub file_format: String,
    pub file_path: String,
    pub file_size: i64,
    pub created_at: DateTime<Utc>,
}

/// The governor's view of one platform's two rolling windows (spec §3/§4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApiCounters {
    pub daily_calls: i64,
    pub quarter_hour_calls: i64,
    pub daily_limit: i64,
    pub quarter_hour_limit: i64,
    pub day_reset_at: DateTime<Utc>,
    pub window_reset_at: DateTime<Utc>,
}
