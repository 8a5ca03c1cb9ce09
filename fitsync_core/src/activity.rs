use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sport::SportType;

/// The logical activity, identified by [`fingerprint`](crate::fingerprint)
/// rather than by any single platform's id (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub fingerprint: String,
    pub name: String,
    pub sport_type: SportType,
    pub start_time: DateTime<Utc>,
    pub distance_m: f64,
    pub duration_s: i64,
    pub elevation_gain_m: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActivityRecord {
    /// Build a record observed for the first time; `fingerprint` is left
    /// for the caller to compute via [`crate::fingerprint::compute`] since
    /// it depends only on the canonicalized fields below.
    pub fn new(
        name: impl Into<String>,
        sport_type: SportType,
        start_time: DateTime<Utc>,
        distance_m: f64,
        duration_s: i64,
        elevation_gain_m: Option<f64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            fingerprint: String::new(),
            name: name.into(),
            sport_type,
            start_time,
            distance_m,
            duration_s,
            elevation_gain_m,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the freshest metadata from a re-observation, leaving
    /// `fingerprint` and `created_at` untouched (spec §3 lifecycle).
    pub fn merge_latest(&mut self, other: &ActivityRecord) {
        self.name = other.name.clone();
        self.sport_type = other.sport_type;
        self.distance_m = other.distance_m;
        self.duration_s = other.duration_s;
        self.elevation_gain_m = other.elevation_gain_m;
        self.updated_at = Utc::now();
    }
}
