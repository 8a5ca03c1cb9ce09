//! Intervals.icu adapter: HTTP basic auth with an API key as the password
//! (the scheme intervals.icu's public API actually documents).

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

const PLATFORM: &str = "intervals_icu";

#[derive(Debug, Deserialize)]
struct IntervalsActivityDto {
    id: String,
    name: String,
    #[serde(rename = "type")]
    activity_type: String,
    #[serde(rename = "start_date_local")]
    start_date_local: DateTime<Utc>,
    distance: Option<f64>,
    #[serde(rename = "moving_time")]
    moving_time: Option<i64>,
    #[serde(rename = "total_elevation_gain")]
    total_elevation_gain: Option<f64>,
}

pub struct IntervalsIcuAdapter {
    client: Client,
    base_url: Url,
    athlete_id: String,
    api_key: String,
}

impl IntervalsIcuAdapter {
    pub fn new(client: Client, base_url: Url, athlete_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url,
            athlete_id: athlete_id.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for IntervalsIcuAdapter {
    fn name(&self) -> &'static str {
        PLATFORM
    }

    async fn list_activities(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ListedActivity>, SyncError> {
        let path = format!("api/v1/athlete/{}/activities", self.athlete_id);
        let url = self.base_url.join(&path).map_err(transport_url_error)?;

        let response = self
            .client
            .get(url)
            .basic_auth("API_KEY", Some(&self.api_key))
            .query(&[("oldest", since.date_naive().to_string()), ("limit", limit.to_string())])
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

        let dtos: Vec<IntervalsActivityDto> = response.json().await.map_err(transport_error)?;
        Ok(dtos
            .into_iter()
            .map(|dto| ListedActivity {
                platform_activity_id: dto.id,
                name: dto.name,
                raw_sport_type: dto.activity_type,
                start_time: dto.start_date_local,
                distance_m: dto.distance.unwrap_or(0.0),
                duration_s: dto.moving_time.unwrap_or(0),
                elevation_gain_m: dto.total_elevation_gain,
                available_formats: vec![FileFormat::Fit],
                is_manual: false,
            })
            .collect())
    }

    async fn download(
        &self,
        platform_activity_id: &str,
        preferred_format: FileFormat,
    ) -> Result<(Vec<u8>, FileFormat), SyncError> {
        let path = format!("api/v1/activity/{platform_activity_id}/file");
        let url = self.base_url.join(&path).map_err(transport_url_error)?;
        let response = self
            .client
            .get(url)
            .basic_auth("API_KEY", Some(&self.api_key))
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK => {
                let bytes = response.bytes().await.map_err(transport_error)?;
                Ok((bytes.to_vec(), preferred_format))
            }
            StatusCode::UNAUTHORIZED => Err(SyncError::Unauthorized {
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
        let path = format!("api/v1/athlete/{}/activities", self.athlete_id);
        let url = self.base_url.join(&path).map_err(transport_url_error)?;
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(format!("{}.{}", metadata.name, format.extension()));
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(url)
            .basic_auth("API_KEY", Some(&self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                #[derive(Deserialize)]
                struct Ack {
                    id: String,
                }
                let ack: Ack = response.json().await.map_err(transport_error)?;
                Ok(UploadOutcome::Accepted { remote_id: ack.id })
            }
            StatusCode::CONFLICT => Ok(UploadOutcome::Duplicate),
            StatusCode::UNAUTHORIZED => Err(SyncError::Unauthorized {
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
        let path = format!("api/v1/athlete/{}", self.athlete_id);
        let url = match self.base_url.join(&path) {
            Ok(url) => url,
            Err(_) => return PlatformHealth::Down,
        };
        match self.client.get(url).basic_auth("API_KEY", Some(&self.api_key)).send().await {
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
