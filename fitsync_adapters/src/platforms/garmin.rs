//! Garmin Connect adapter: cookie-session based, the way a browser-backed
//! SSO login would be (auth handshake itself is adapter-internal, spec
//! §4.6 — we just assume the session cookie jar is already populated by
//! the driver before the adapter is constructed).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fitsync_core::error::SyncError;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::adapter::{
    FileFormat, ListedActivity, PlatformAdapter, PlatformHealth, PlatformInfo, UploadMetadata,
    UploadOutcome,
};

const PLATFORM: &str = "garmin";

#[derive(Debug, Deserialize)]
struct GarminActivityDto {
    #[serde(rename = "activityId")]
    activity_id: i64,
    #[serde(rename = "activityName")]
    activity_name: String,
    #[serde(rename = "activityType")]
    activity_type: GarminActivityType,
    #[serde(rename = "startTimeGMT")]
    start_time_gmt: DateTime<Utc>,
    distance: Option<f64>,
    duration: Option<f64>,
    #[serde(rename = "elevationGain")]
    elevation_gain: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GarminActivityType {
    #[serde(rename = "typeKey")]
    type_key: String,
}

pub struct GarminAdapter {
    client: Client,
    base_url: Url,
}

impl GarminAdapter {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl PlatformAdapter for GarminAdapter {
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
            .join("activitylist-service/activities/search/activities")
            .map_err(transport_url_error)?;

        let response = self
            .client
            .get(url)
            .query(&[("limit", limit.to_string()), ("startDate", since.to_rfc3339())])
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
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

        let dtos: Vec<GarminActivityDto> = response.json().await.map_err(transport_error)?;
        Ok(dtos
            .into_iter()
            .map(|dto| ListedActivity {
                platform_activity_id: dto.activity_id.to_string(),
                name: dto.activity_name,
                raw_sport_type: dto.activity_type.type_key,
                start_time: dto.start_time_gmt,
                distance_m: dto.distance.unwrap_or(0.0),
                duration_s: dto.duration.unwrap_or(0.0) as i64,
                elevation_gain_m: dto.elevation_gain,
                available_formats: vec![FileFormat::Fit, FileFormat::Tcx],
                is_manual: false,
            })
            .collect())
    }

    async fn download(
        &self,
        platform_activity_id: &str,
        preferred_format: FileFormat,
    ) -> Result<(Vec<u8>, FileFormat), SyncError> {
        let path = match preferred_format {
            FileFormat::Fit => format!("download-service/files/activity/{platform_activity_id}"),
            FileFormat::Tcx => format!("download-service/export/tcx/activity/{platform_activity_id}"),
            FileFormat::Gpx => format!("download-service/export/gpx/activity/{platform_activity_id}"),
        };
        let url = self.base_url.join(&path).map_err(transport_url_error)?;
        let response = self.client.get(url).send().await.map_err(transport_error)?;

        match response.status() {
            StatusCode::OK => {
                let bytes = response.bytes().await.map_err(transport_error)?;
                Ok((bytes.to_vec(), preferred_format))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::Unauthorized {
                platform: PLATFORM.to_string(),
            }),
            StatusCode::NOT_FOUND => Err(SyncError::NotFound {
                platform: PLATFORM.to_string(),
            }),
            other => Err(SyncError::Transport {
                platform: PLATFORM.to_string(),
                message: format!("unexpected status {other}"),
            }),
        }
    }

    async fn upload(
        &self,
        bytes: &[u8],
        format: FileFormat,
        metadata: &UploadMetadata,
    ) -> Result<UploadOutcome, SyncError> {
        let url = self
            .base_url
            .join("upload-service/upload")
            .map_err(transport_url_error)?;
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(format!("{}.{}", metadata.name, format.extension()));
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                #[derive(Deserialize)]
                struct UploadAck {
                    #[serde(rename = "activityId")]
                    activity_id: i64,
                }
                let ack: UploadAck = response.json().await.map_err(transport_error)?;
                Ok(UploadOutcome::Accepted {
                    remote_id: ack.activity_id.to_string(),
                })
            }
            StatusCode::CONFLICT => Ok(UploadOutcome::Duplicate),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::Unauthorized {
                platform: PLATFORM.to_string(),
            }),
            StatusCode::UNPROCESSABLE_ENTITY => {
                let reason = response.text().await.unwrap_or_default();
                Ok(UploadOutcome::Rejected { reason })
            }
            _ => Ok(UploadOutcome::TransientError),
        }
    }

    fn supported_upload_formats(&self) -> Vec<FileFormat> {
        vec![FileFormat::Fit, FileFormat::Tcx]
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
        let url = match self.base_url.join("userprofile-service/userprofile") {
            Ok(url) => url,
            Err(_) => return PlatformHealth::Down,
        };
        match self.client.get(url).send().await {
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

fn transport_url_error(err: url::ParseError) -> SyncError {
    SyncError::Transport {
        platform: PLATFORM.to_string(),
        message: err.to_string(),
    }
}
