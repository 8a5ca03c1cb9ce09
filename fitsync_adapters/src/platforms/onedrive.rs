//! OneDrive adapter: files uploaded via the Microsoft Graph API into a
//! well-known app folder. OneDrive is destination-only in practice (spec
//! §1 lists it as a destination used for Fog-of-World-style tools), so
//! `list_activities`/`download` are implemented for interface
//! completeness but not expected to be exercised by any configured
//! direction.

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

const PLATFORM: &str = "onedrive";

pub struct OneDriveAdapter {
    client: Client,
    base_url: Url,
    access_token: String,
    app_folder: String,
}

impl OneDriveAdapter {
    pub fn new(client: Client, base_url: Url, access_token: String, app_folder: impl Into<String>) -> Self {
        Self {
            client,
            base_url,
            access_token,
            app_folder: app_folder.into(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for OneDriveAdapter {
    fn name(&self) -> &'static str {
        PLATFORM
    }

    async fn list_activities(
        &self,
        _since: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<ListedActivity>, SyncError> {
        // OneDrive holds opaque GPX files, not a queryable activity
        // catalog; it never originates activities for any configured
        // direction (spec §1), so this always returns empty.
        Ok(Vec::new())
    }

    async fn download(
        &self,
        platform_activity_id: &str,
        _preferred_format: FileFormat,
    ) -> Result<(Vec<u8>, FileFormat), SyncError> {
        Err(SyncError::NotFound {
            platform: format!("{PLATFORM} (no source support, requested {platform_activity_id})"),
        })
    }

    async fn upload(
        &self,
        bytes: &[u8],
        format: FileFormat,
        metadata: &UploadMetadata,
    ) -> Result<UploadOutcome, SyncError> {
        if format != FileFormat::Gpx {
            return Err(SyncError::UnsupportedConversion {
                from: format.extension().to_string(),
                to: "gpx".to_string(),
            });
        }
        let file_name = sanitize_file_name(&metadata.name);
        let path = format!(
            "v1.0/me/drive/special/approot:/{}/{file_name}.gpx:/content",
            self.app_folder
        );
        let url = self.base_url.join(&path).map_err(transport_url_error)?;

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                #[derive(Deserialize)]
                struct DriveItem {
                    id: String,
                }
                let item: DriveItem = response.json().await.map_err(transport_error)?;
                Ok(UploadOutcome::Accepted { remote_id: item.id })
            }
            StatusCode::CONFLICT => Ok(UploadOutcome::Duplicate),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::Unauthorized {
                platform: PLATFORM.to_string(),
            }),
            _ => Ok(UploadOutcome::TransientError),
        }
    }

    fn supported_upload_formats(&self) -> Vec<FileFormat> {
        vec![FileFormat::Gpx]
    }

    fn info(&self) -> PlatformInfo {
        PlatformInfo {
            platform_name: PLATFORM,
            api_cost_per_list: 0,
            api_cost_per_download: 0,
            api_cost_per_upload: 1,
        }
    }

    async fn health_check(&self) -> PlatformHealth {
        let url = match self.base_url.join("v1.0/me/drive") {
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

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_unsafe_characters() {
        assert_eq!(sanitize_file_name("Morning Ride: Loop #1"), "Morning_Ride__Loop__1");
    }
}
