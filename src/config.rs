//! `.app_config.json` loading (spec §6). A deliberate departure from the
//! teacher's `dotenv`/`envy`-driven `GarminConfig`: the spec names a JSON
//! config file, not `config.env`, so this reads/writes `serde_json`
//! directly. Path resolution still follows the teacher's `dirs`-based
//! convention (see `garmin_config.rs`'s `get_config`).
//!
//! Each platform block separates user-supplied credentials (never
//! touched by the adapters) from session state the adapters may refresh
//! and that `--clear-<platform>-session` resets.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StravaConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GarminConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub session_cookie: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OneDriveConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_onedrive_folder")]
    pub app_folder: String,
}

fn default_onedrive_folder() -> String {
    "FitSync".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IgpSportConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub access_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntervalsIcuConfig {
    pub athlete_id: String,
    pub api_key: String,
}

/// Everything not tied to one platform: governor margins are fixed in
/// `fitsync_governor::PlatformBudget` defaults, so the only tunable
/// surfaced here is the cache TTL (spec §4.4 CacheEntry lifecycle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunables {
    #[serde(default = "default_cache_ttl_days")]
    pub cache_ttl_days: i64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            cache_ttl_days: default_cache_ttl_days(),
        }
    }
}

fn default_cache_ttl_days() -> i64 {
    30
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub strava: Option<StravaConfig>,
    pub garmin: Option<GarminConfig>,
    pub onedrive: Option<OneDriveConfig>,
    pub igpsport: Option<IgpSportConfig>,
    pub intervals_icu: Option<IntervalsIcuConfig>,
    #[serde(default)]
    pub tunables: Tunables,
    /// Directions `sync --auto` runs without an explicit `--directions`
    /// list, each `"src->dst"` (spec §6).
    #[serde(default)]
    pub enabled_directions: Vec<String>,

    /// Directory the config file itself lives in; every other persisted
    /// path (spec §6 layout) is resolved relative to it. Not serialized —
    /// it's derived from wherever the file was actually found.
    #[serde(skip, default)]
    project_root: PathBuf,
}

impl AppConfig {
    /// Resolution order mirrors the teacher's `get_config`: an explicit
    /// path wins, then `./.app_config.json` in the current directory,
    /// then `$XDG_CONFIG_HOME/fitsync/app_config.json`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(explicit)?;
        let project_root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        if !path.exists() {
            return Ok(Self {
                project_root,
                ..Self::default()
            });
        }

        let bytes = std::fs::read(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let mut config: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.project_root = project_root;
        Ok(config)
    }

    fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        let cwd_candidate = PathBuf::from(".app_config.json");
        if cwd_candidate.exists() {
            return Ok(cwd_candidate);
        }
        let config_dir = dirs::config_dir().ok_or_else(|| anyhow!("no config directory for this platform"))?;
        Ok(config_dir.join("fitsync").join("app_config.json"))
    }

    pub fn save(&self) -> Result<()> {
        let path = self.project_root.join(".app_config.json");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, bytes).with_context(|| format!("writing config file {}", path.display()))
    }

    pub fn database_path(&self) -> PathBuf {
        self.project_root.join("sync_database.db")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.project_root.join("activity_cache")
    }

    pub fn log_path(&self) -> PathBuf {
        self.project_root.join("sync_logs.log")
    }

    /// `--clear-<platform>-session`: wipes adapter-writable session state
    /// while leaving user-supplied credentials (client id/secret,
    /// username/password, api key) intact so the next run can re-auth
    /// without the user re-entering anything static.
    pub fn clear_session(&mut self, platform: &str) -> Result<()> {
        match platform {
            "strava" => {
                if let Some(c) = self.strava.as_mut() {
                    c.access_token.clear();
                    c.refresh_token.clear();
                }
            }
            "garmin" => {
                if let Some(c) = self.garmin.as_mut() {
                    c.session_cookie.clear();
                }
            }
            "onedrive" => {
                if let Some(c) = self.onedrive.as_mut() {
                    c.access_token.clear();
                    c.refresh_token.clear();
                }
            }
            "igpsport" => {
                if let Some(c) = self.igpsport.as_mut() {
                    c.access_token.clear();
                }
            }
            other => return Err(anyhow!("unknown platform \"{}\"", other)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_file_yields_defaults_not_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".app_config.json");
        let config = AppConfig::load(Some(&path)).unwrap();
        assert!(config.strava.is_none());
        assert_eq!(config.tunables.cache_ttl_days, 30);
    }

    #[test]
    fn round_trips_through_disk_and_clears_only_session_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".app_config.json");

        let mut config = AppConfig::load(Some(&path)).unwrap();
        config.strava = Some(StravaConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            access_token: "tok".to_string(),
            refresh_token: "refresh".to_string(),
        });
        config.save().unwrap();

        let mut reloaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(reloaded.strava.as_ref().unwrap().access_token, "tok");

        reloaded.clear_session("strava").unwrap();
        let strava = reloaded.strava.as_ref().unwrap();
        assert!(strava.access_token.is_empty());
        assert_eq!(strava.client_id, "id");
    }
}
