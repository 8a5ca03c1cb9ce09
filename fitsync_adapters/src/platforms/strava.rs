//! Strava adapter: OAuth2 bearer session, manual-activity detection
//! (spec §4.7), and the platform most of the Rate-Limit Governor's
//! defaults are tuned for (spec §4.5).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fitsync_core::error::SyncError;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::RwLock;
use url::Url;

use crate::adapter::{
    FileFormat, ListedActivity, PlatformAdapter, PlatformHealth, PlatformInfo, UploadMetadata,
    UploadOutcome,
};

const PLATFORM: &str = "strava";

/// HTML landmark Strava's login page carries; used to tell an
/// authentication failure apart from the HTML a manually-created
/// activity's "original file" download also returns (spec §4.7).
const LOGIN_LANDMARK: &str = "id=\"login-google\"";

#[derive(Debug, Deserialize)]
struct StravaActivityDto {
    id: i64,
    name: String,
    #[serde(rename = "type")]
    activity_type: String,
    start_date: DateTime<Utc>,
    distance: Option<f64>,
    moving_time: Option<i64>,
    elapsed_time: i64,
    total_elevation_gain: Option<f64>,
    device_name: Option<String>,
    upload_id: Option<i64>,
    external_id: Option<String>,
}

impl StravaActivityDto {
    /// No device name, upload id, or external id -> created directly in
    /// Strava's UI, no downloadable original (spec §4.7).
    fn is_manual(&self) -> bool {
        self.device_name.is_none() && self.upload_id.is_none() && self.external_id.is_none()
    }
}

pub struct StravaAdapter {
    client: Client,
    base_url: Url,
    access_token: RwLock<String>,
}

impl StravaAdapter {
    pub fn new(client: Client, base_url: Url, access_token: String) -> Self {
        Self {
            client,
            base_url,
            access_token: RwLock::new(access_token),
        }
    }

    /// Called by the driver after an adapter surfaces `Unauthorized` and
    /// the user re-authenticates (spec §4.6).
    pub fn set_access_token(&self, token: String) {
        *self.access_token.write().expect("lock poisoned") = token;
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token.read().expect("lock poisoned"))
    }
}

#[async_trait]
impl PlatformAdapter for StravaAdapter {
    fn name(&self) -> &'static str {
        PLATFORM
    }

    async fn list_activities(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ListedActivity>, SyncError> {
        let url = self
            .base_url
            .join("athlete/activities")
            .map_err(|e| SyncError::Transport {
                platform: PLATFORM.to_string(),
                message: e.to_string(),
            })?;

        let response = self
            .client
            .get(url)
            .header("Authorization", self.bearer())
            .query(&[
                ("after", since.timestamp().to_string()),
                ("per_page", limit.to_string()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Unauthorized {
                platform: PLATFORM.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(SyncError::Transport {
                platform: PLATFORM.to_string(),
                message: format!("unexpected status {}", response.status()),
            });
        }

        let dtos: Vec<StravaActivityDto> = response.json().await.map_err(transport_error)?;
        Ok(dtos
            .into_iter()
            .map(|dto| ListedActivity {
                platform_activity_id: dto.id.to_string(),
                name: dto.name,
                raw_sport_type: dto.activity_type,
                start_time: dto.start_date,
                distance_m: dto.distance.unwrap_or(0.0),
                duration_s: dto.moving_time.unwrap_or(dto.elapsed_time),
                elevation_gain_m: dto.total_elevation_gain,
                available_formats: vec![FileFormat::Fit],
                is_manual: dto.is_manual(),
            })
            .collect())
    }

    async fn download(
        &self,
        platform_activity_id: &str,
        preferred_format: FileFormat,
    ) -> Result<(Vec<u8>, FileFormat), SyncError> {
        let url = self
            .base_url
            .join(&format!("activities/{platform_activity_id}/export_original"))
            .map_err(|e| SyncError::Transport {
                platform: PLATFORM.to_string(),
                message: e.to_string(),
            })?;

        let response = self
            .client
            .get(url)
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(transport_error)?;

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/html"))
            .unwrap_or(false);

        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;

        if is_html {
            let body = String::from_utf8_lossy(&bytes);
            return if body.contains(LOGIN_LANDMARK) {
                Err(SyncError::Unauthorized {
                    platform: PLATFORM.to_string(),
                })
            } else {
                // HTML, not the login page: this is the manually-created
                // activity's placeholder page, not an auth failure.
                Err(SyncError::NoOriginalFile)
            };
        }
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound {
                platform: PLATFORM.to_string(),
            });
        }
        if !status.is_success() {
            return Err(SyncError::Transport {
                platform: PLATFORM.to_string(),
                message: format!("unexpected status {status}"),
            });
        }

        debug!("downloaded {} bytes for strava activity {platform_activity_id}", bytes.len());
        Ok((bytes.to_vec(), preferred_format))
    }

    async fn upload(
        &self,
        bytes: &[u8],
        format: FileFormat,
        metadata: &UploadMetadata,
    ) -> Result<UploadOutcome, SyncError> {
        let url = self
            .base_url
            .join("uploads")
            .map_err(|e| SyncError::Transport {
                platform: PLATFORM.to_string(),
                message: e.to_string(),
            })?;

        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(format!("activity.{}", format.extension()));
        let form = reqwest::multipart::Form::new()
            .text("data_type", format.extension())
            .text("name", metadata.name.clone())
            .part("file", part);

        let response = self
            .client
            .post(url)
            .header("Authorization", self.bearer())
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => {
                #[derive(Deserialize)]
                struct UploadAck {
                    id: i64,
                }
                let ack: UploadAck = response.json().await.map_err(transport_error)?;
                Ok(UploadOutcome::Accepted {
                    remote_id: ack.id.to_string(),
                })
            }
            StatusCode::CONFLICT => Ok(UploadOutcome::Duplicate),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let reason = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "rejected".to_string());
                Ok(UploadOutcome::Rejected { reason })
            }
            StatusCode::UNAUTHORIZED => Err(SyncError::Unauthorized {
                platform: PLATFORM.to_string(),
            }),
            _ => {
                warn!("strava upload transient failure: {}", response.status());
                Ok(UploadOutcome::TransientError)
            }
        }
    }

    fn supported_upload_formats(&self) -> Vec<FileFormat> {
        vec![FileFormat::Fit, FileFormat::Tcx, FileFormat::Gpx]
    }

    fn info(&self) -> PlatformInfo {
        PlatformInfo {
            platform_name: PLATFORM,
            api_cost_per_list: 1,
            api_cost_per_download: 1,
            api_cost_per_upload: 1,
        }
    }

    async fn health_check(&self) -> PlatformHealth {
        let url = match self.base_url.join("athlete") {
            Ok(url) => url,
            Err(_) => return PlatformHealth::Down,
        };
        match self
            .client
            .get(url)
            .header("Authorization", self.bearer())
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => PlatformHealth::Ok,
            Ok(_) => PlatformHealth::Degraded,
            Err(_) => PlatformHealth::Down,
        }
    }
}

fn transport_error(err: reqwest::Error) -> SyncError {
    SyncError::Transport {
        platform: PLATFORM.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_activity_has_no_device_upload_or_external_id() {
        let dto = StravaActivityDto {
            id: 1,
            name: "Evening Walk".to_string(),
            activity_type: "Walk".to_string(),
            start_date: Utc::now(),
            distance: Some(1000.0),
            moving_time: Some(600),
            elapsed_time: 600,
            total_elevation_gain: None,
            device_name: None,
            upload_id: None,
            external_id: None,
        };
        assert!(dto.is_manual());
    }

    #[test]
    fn device_activity_is_not_manual() {
        let dto = StravaActivityDto {
            id: 2,
            name: "Morning Ride".to_string(),
            activity_type: "Ride".to_string(),
            start_date: Utc::now(),
            distance: Some(20000.0),
            moving_time: Some(3600),
            elapsed_time: 3600,
            total_elevation_gain: Some(120.0),
            device_name: Some("Edge 830".to_string()),
            upload_id: Some(999),
            external_id: Some("garmin_push_1".to_string()),
        };
        assert!(!dto.is_manual());
    }
}
