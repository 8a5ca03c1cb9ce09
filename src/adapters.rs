//! Wires `.app_config.json` credential blocks into adapter instances and
//! registers them (spec §9 "Polymorphism" — this is the only place that
//! knows about all five platforms at once; the executor never does).

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use fitsync_adapters::{
    platforms::{
        garmin::GarminAdapter, igpsport::IgpSportAdapter, intervals_icu::IntervalsIcuAdapter,
        onedrive::OneDriveAdapter, strava::StravaAdapter,
    },
    AdapterRegistry,
};
use fitsync_governor::PlatformBudget;
use reqwest::{cookie::Jar, Client};
use url::Url;

use crate::config::AppConfig;

const STRAVA_BASE: &str = "https://www.strava.com/api/v3/";
const GARMIN_BASE: &str = "https://connect.garmin.com/";
const ONEDRIVE_BASE: &str = "https://graph.microsoft.com/v1.0/";
const IGPSPORT_BASE: &str = "https://prod.zh.igpsport.com/";
const INTERVALS_BASE: &str = "https://intervals.icu/api/v1/";

pub fn build_registry(config: &AppConfig) -> Result<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();

    if let Some(strava) = &config.strava {
        let client = plain_client()?;
        let base_url = Url::parse(STRAVA_BASE)?;
        registry.register(Arc::new(StravaAdapter::new(
            client,
            base_url,
            strava.access_token.clone(),
        )));
    }

    if let Some(garmin) = &config.garmin {
        let base_url = Url::parse(GARMIN_BASE)?;
        let jar = Jar::default();
        if !garmin.session_cookie.is_empty() {
            jar.add_cookie_str(&garmin.session_cookie, &base_url);
        }
        let client = Client::builder()
            .cookie_provider(Arc::new(jar))
            .build()
            .context("building garmin http client")?;
        registry.register(Arc::new(GarminAdapter::new(client, base_url)));
    }

    if let Some(onedrive) = &config.onedrive {
        let client = plain_client()?;
        let base_url = Url::parse(ONEDRIVE_BASE)?;
        registry.register(Arc::new(OneDriveAdapter::new(
            client,
            base_url,
            onedrive.access_token.clone(),
            onedrive.app_folder.clone(),
        )));
    }

    if let Some(igpsport) = &config.igpsport {
        let client = plain_client()?;
        let base_url = Url::parse(IGPSPORT_BASE)?;
        registry.register(Arc::new(IgpSportAdapter::new(
            client,
            base_url,
            igpsport.access_token.clone(),
        )));
    }

    if let Some(intervals) = &config.intervals_icu {
        let client = plain_client()?;
        let base_url = Url::parse(INTERVALS_BASE)?;
        registry.register(Arc::new(IntervalsIcuAdapter::new(
            client,
            base_url,
            intervals.athlete_id.clone(),
            intervals.api_key.clone(),
        )));
    }

    Ok(registry)
}

fn plain_client() -> Result<Client> {
    Client::builder().build().context("building http client")
}

/// Strava's the only platform spec §4.5 names explicit caps for; every
/// other platform gets the generous default until it proves it needs
/// tuning.
pub fn budgets(config: &AppConfig) -> HashMap<String, PlatformBudget> {
    let mut map = HashMap::new();
    if config.strava.is_some() {
        map.insert("strava".to_string(), PlatformBudget::strava_default());
    }
    map
}
