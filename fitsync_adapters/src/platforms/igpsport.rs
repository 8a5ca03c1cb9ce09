//! IGPSport adapter: simple bearer-token REST API, FIT-only.

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

const PLATFORM: &str = "igpsport";

#[derive(Debug, Deserialize)]
struct IgpActivityDto {
    #[serde(rename = "rideId")]
    ride_id: i64,
    title: String,
    #[serde(rename = "sportType")]
    sport_type: String,
    #[serde(rename = "startTime")]
    start_time: DateTime<Utc>,
    distance: Option<f64>,
    #[serde(rename = "movingTime")]
    moving_time: Option<i64>,
    #[serde(rename = "totalAscent")]
    total_ascent: Option<f64>,
}

pub struct IgpSportAdapter {
    client: Client,
    base_url: Url,
    access_token: String,
}

impl IgpSportAdapter {
    pub fn new(client: Client, base_url: Url, access_token: String) -> Self {
        Self {
            client,
            base_url,
            access_token,
        }
    }
}

#[async_trait]
impl PlatformAdapter for IgpSportAdapter {
    fn name(&self) -> &'static str {
        PLATFORM
    }

    async fn list_activities(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ListedActivity>, SyncError> {
        let url = self.base_url.join("v1/rides").map_err(transport_url_error)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&[("since", since.timestamp().to_string()), ("limit", limit.to_string())])
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

        let dtos: Vec<IgpActivityDto> = response.json().await.map_err(transport_error)?;
        Ok(dtos
            .into_iter()
            .map(|dto| ListedActivity {
                platform_activity_id: dto.ride_id.to_string(),
                name: dto.title,
                raw_sport_type: dto.sport_type,
                start_time: dto.start_time,
                distance_m: dto.distance.unwrap_or(0.0),
                duration_s: dto.moving_time.unwrap_or(0),
                elevation_gain_m: dto.total_ascent,
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
        let url = self
            .base_url
            .join(&format!("v1/rides/{platform_activity_id}/fit"))
            .map_err(transport_url_error)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK => {
                let bytes = response.bytes().await.map_err(transport_error)?;
                Ok((bytes.to_vec(), FileFormat::Fit))
            }
            StatusCode::UNAUTHORIZED => Err(SyncError::Unauthorized {
                platform: PLATFORM.to_string(),
            }),
            StatusCode::NOT_FOUND => Err(SyncError::NotFound {
                platform: PLATFORM.to_string(),
            }),
            other => Err(SyncError::Transport {
                platform: PLATFORM.to_string(),
                message: format!("unexpected status {other}, wanted {:?}", preferred_format),
            }),
        }
    }

    async fn upload(
        &self,
        bytes: &[u8],
        format: FileFormat,
        metadata: &UploadMetadata,
    ) -> Result<UploadOutcome, SyncError> {
        if format != FileFormat::Fit {
            return Err(SyncError::UnsupportedConversion {
                from: format.extension().to_string(),
                to: "fit".to_string(),
            });
        }
        let url = self.base_url.join("v1/rides").map_err(transport_url_error)?;
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(format!("{}.fit", metadata.name));
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                #[derive(Deserialize)]
                struct Ack {
                    #[serde(rename = "rideId")]
                    ride_id: i64,
                }
                let ack: Ack = response.json().await.map_err(transport_error)?;
                Ok(UploadOutcome::Accepted {
                    remote_id: ack.ride_id.to_string(),
                })
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
        vec![FileFormat::Fit]
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
        let url = match self.base_url.join("v1/ping") {
            Ok(url) => url,
            Err(_) => return PlatformHealth::Down,
        };
        match self.client.get(url).bearer_auth(&self.access_token).send().await {
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
