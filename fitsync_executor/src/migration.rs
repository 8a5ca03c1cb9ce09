//! Migration Harness (C8): a one-shot upgrade path from a legacy JSON
//! state file — the shape a pre-catalog FitSync deployment produced — to
//! the catalog store. Populates `activity_records` and
//! `platform_mappings`; `sync_status` is left untouched and recomputed
//! by the next ordinary sync pass, since the legacy format predates
//! directional sync state.

use std::path::Path;

use chrono::{DateTime, Utc};
use fitsync_catalog::{CatalogError, CatalogStore};
use fitsync_core::{error::SyncError, fingerprint, sport, ActivityRecord};
use log::info;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyActivityRecord {
    pub platform: String,
    pub platform_activity_id: String,
    pub name: String,
    pub sport_type: String,
    pub start_time: DateTime<Utc>,
    pub distance_m: f64,
    pub duration_s: i64,
    pub elevation_gain_m: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MigrationReport {
    pub records_read: usize,
    pub activities_created: usize,
    pub mappings_created: usize,
}

pub async fn migrate_from_json(path: &Path, catalog: &CatalogStore) -> Result<MigrationReport, SyncError> {
    let bytes = tokio::fs::read(path).await?;
    let legacy: Vec<LegacyActivityRecord> =
        serde_json::from_slice(&bytes).map_err(|e| SyncError::Validation(e.to_string()))?;

    let mut report = MigrationReport::default();
    for entry in &legacy {
        report.records_read += 1;

        let sport_type = sport::normalize(&entry.sport_type);
        let fp = fingerprint::compute(sport_type, entry.start_time, entry.distance_m, entry.duration_s);

        let already_known = catalog.get_activity(&fp).await.map_err(catalog_corruption)?.is_some();
        let mut record = ActivityRecord::new(
            entry.name.clone(),
            sport_type,
            entry.start_time,
            entry.distance_m,
            entry.duration_s,
            entry.elevation_gain_m,
        );
        record.fingerprint = fp.clone();
        catalog.upsert_activity(&record).await.map_err(catalog_corruption)?;
        if !already_known {
            report.activities_created += 1;
        }

        let already_mapped = catalog
            .get_mapping(&fp, &entry.platform)
            .await
            .map_err(catalog_corruption)?
            .is_some();
        catalog
            .record_mapping(&fp, &entry.platform, &entry.platform_activity_id)
            .await
            .map_err(catalog_corruption)?;
        if !already_mapped {
            report.mappings_created += 1;
        }
    }

    info!(
        "migration read {} legacy records, created {} activities, {} mappings",
        report.records_read, report.activities_created, report.mappings_created
    );
    Ok(report)
}

fn catalog_corruption(err: CatalogError) -> SyncError {
    SyncError::CatalogCorruption(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn migrates_legacy_records_without_touching_status() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        tokio::fs::write(
            &path,
            r#"[
                {
                    "platform": "strava",
                    "platform_activity_id": "S1",
                    "name": "Old Ride",
                    "sport_type": "ride",
                    "start_time": "2024-01-01T08:00:00Z",
                    "distance_m": 20000.0,
                    "duration_s": 3600,
                    "elevation_gain_m": 150.0
                }
            ]"#,
        )
        .await
        .unwrap();

        let catalog = CatalogStore::open_in_memory().await.unwrap();
        let report = migrate_from_json(&path, &catalog).await.unwrap();
        assert_eq!(report.records_read, 1);
        assert_eq!(report.activities_created, 1);
        assert_eq!(report.mappings_created, 1);

        // re-running is idempotent: no new rows, same counts at zero this time.
        let second = migrate_from_json(&path, &catalog).await.unwrap();
        assert_eq!(second.activities_created, 0);
        assert_eq!(second.mappings_created, 0);
    }
}
