use std::{path::Path, str::FromStr};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fitsync_core::{sport::SportType, ActivityRecord};
use log::debug;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};

use crate::{error::CatalogError, models::{ApiCounters, CacheEntry, PlatformMapping}, status::SyncStatusValue};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// The durable Catalog Store (spec §4.4), backed by an embedded SQLite
/// database. Every public method here is one transaction; batch callers
/// (the migration harness) are expected to loop calling these, not to
/// reach into the pool directly.
#[derive(Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    /// Open (creating if absent) the database at `path` and run pending
    /// migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}",
            path.as_ref().display()
        ))?
        .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database, used by tests and by ephemeral CLI invocations
    /// like `convert --info`.
    pub async fn open_in_memory() -> Result<Self, CatalogError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    // ---- activity_records -------------------------------------------------

    /// Insert or update by fingerprint; idempotent on identical input
    /// (spec §4.4).
    pub async fn upsert_activity(&self, record: &ActivityRecord) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO activity_records
                (fingerprint, name, sport_type, start_time, distance_m, duration_s, elevation_gain_m, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(fingerprint) DO UPDATE SET
                name = excluded.name,
                sport_type = excluded.sport_type,
                start_time = excluded.start_time,
                distance_m = excluded.distance_m,
                duration_s = excluded.duration_s,
                elevation_gain_m = excluded.elevation_gain_m,
                updated_at = excluded.updated_at",
        )
        .bind(&record.fingerprint)
        .bind(&record.name)
        .bind(record.sport_type.as_str())
        .bind(record.start_time.to_rfc3339())
        .bind(record.distance_m)
        .bind(record.duration_s)
        .bind(record.elevation_gain_m)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        debug!("upserted activity {}", record.fingerprint);
        Ok(())
    }

    pub async fn get_activity(
        &self,
        fingerprint: &str,
    ) -> Result<Option<ActivityRecord>, CatalogError> {
        let row = sqlx::query(
            "SELECT fingerprint, name, sport_type, start_time, distance_m, duration_s, elevation_gain_m, created_at, updated_at
             FROM activity_records WHERE fingerprint = ?",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_activity).transpose()
    }

    // ---- platform_mappings --------------------------------------------------

    /// Unique upsert per `(fingerprint, platform)` (spec §3/§4.4).
    pub async fn record_mapping(
        &self,
        fingerprint: &str,
        platform: &str,
        platform_activity_id: &str,
    ) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO platform_mappings (fingerprint, platform, platform_activity_id, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(fingerprint, platform) DO UPDATE SET
                platform_activity_id = excluded.platform_activity_id",
        )
        .bind(fingerprint)
        .bind(platform)
        .bind(platform_activity_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_mapping(
        &self,
        fingerprint: &str,
        platform: &str,
    ) -> Result<Option<String>, CatalogError> {
        let row = sqlx::query(
            "SELECT platform_activity_id FROM platform_mappings WHERE fingerprint = ? AND platform = ?",
        )
        .bind(fingerprint)
        .bind(platform)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<String, _>("platform_activity_id")))
    }

    /// Reverse lookup: does any fingerprint already map to this platform id?
    pub async fn get_mappings_by_platform_id(
        &self,
        platform: &str,
        platform_activity_id: &str,
    ) -> Result<Option<String>, CatalogError> {
        let row = sqlx::query(
            "SELECT fingerprint FROM platform_mappings WHERE platform = ? AND platform_activity_id = ?",
        )
        .bind(platform)
        .bind(platform_activity_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<String, _>("fingerprint")))
    }

    pub async fn list_mappings(&self, fingerprint: &str) -> Result<Vec<PlatformMapping>, CatalogError> {
        let rows = sqlx::query(
            "SELECT fingerprint, platform, platform_activity_id, created_at FROM platform_mappings WHERE fingerprint = ?",
        )
        .bind(fingerprint)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_mapping).collect()
    }

    // ---- sync_status ---------------------------------------------------------

    /// Terminal transitions (`synced`/`duplicate`) never regress to
    /// `pending` except through an explicit administrative clear (spec
    /// §4.4) — enforced here, not just by caller discipline.
    pub async fn set_status(
        &self,
        fingerprint: &str,
        source_platform: &str,
        target_platform: &str,
        status: &SyncStatusValue,
    ) -> Result<(), CatalogError> {
        if let Some(current) = self
            .get_status(fingerprint, source_platform, target_platform)
            .await?
        {
            if current.is_terminal_success() && !matches!(status, SyncStatusValue::Synced | SyncStatusValue::Duplicate) {
                return Err(CatalogError::InvalidStatusTransition {
                    fingerprint: fingerprint.to_string(),
                    from: current.to_string(),
                    to: status.to_string(),
                });
            }
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO sync_status (fingerprint, source_platform, target_platform, status, reason, retry_count, updated_at)
             VALUES (?, ?, ?, ?, ?, 0, ?)
             ON CONFLICT(fingerprint, source_platform, target_platform) DO UPDATE SET
                status = excluded.status,
                reason = excluded.reason,
                retry_count = 0,
                updated_at = excluded.updated_at",
        )
        .bind(fingerprint)
        .bind(source_platform)
        .bind(target_platform)
        .bind(status.tag())
        .bind(status.reason())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// A transient upload failure (spec §4.9 step 7): increments the
    /// retry counter and only lets the activity fall terminally `failed`
    /// once `max_retries` is exceeded; otherwise it stays `pending` so
    /// the next run retries it.
    pub async fn record_transient_failure(
        &self,
        fingerprint: &str,
        source_platform: &str,
        target_platform: &str,
        max_retries: i64,
        fail_reason: &str,
    ) -> Result<SyncStatusValue, CatalogError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT retry_count FROM sync_status WHERE fingerprint = ? AND source_platform = ? AND target_platform = ?",
        )
        .bind(fingerprint)
        .bind(source_platform)
        .bind(target_platform)
        .fetch_optional(&mut *tx)
        .await?;
        let next_retries = row.map(|r| r.get::<i64, _>("retry_count")).unwrap_or(0) + 1;
        let status = if next_retries > max_retries {
            SyncStatusValue::Failed(fail_reason.to_string())
        } else {
            SyncStatusValue::Pending
        };

        sqlx::query(
            "INSERT INTO sync_status (fingerprint, source_platform, target_platform, status, reason, retry_count, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(fingerprint, source_platform, target_platform) DO UPDATE SET
                status = excluded.status,
                reason = excluded.reason,
                retry_count = excluded.retry_count,
                updated_at = excluded.updated_at",
        )
        .bind(fingerprint)
        .bind(source_platform)
        .bind(target_platform)
        .bind(status.tag())
        .bind(status.reason())
        .bind(next_retries)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(status)
    }

    /// Explicit administrative clear — the only allowed reset of a
    /// terminal status back to `pending` (spec §4.4).
    pub async fn clear_status(
        &self,
        fingerprint: &str,
        source_platform: &str,
        target_platform: &str,
    ) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM sync_status WHERE fingerprint = ? AND source_platform = ? AND target_platform = ?",
        )
        .bind(fingerprint)
        .bind(source_platform)
        .bind(target_platform)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_status(
        &self,
        fingerprint: &str,
        source_platform: &str,
        target_platform: &str,
    ) -> Result<Option<SyncStatusValue>, CatalogError> {
        let row = sqlx::query(
            "SELECT status, reason FROM sync_status WHERE fingerprint = ? AND source_platform = ? AND target_platform = ?",
        )
        .bind(fingerprint)
        .bind(source_platform)
        .bind(target_platform)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let tag: String = row.get("status");
                let reason: Option<String> = row.get("reason");
                Ok(Some(SyncStatusValue::from_row(&tag, reason)?))
            }
            None => Ok(None),
        }
    }

    pub async fn list_pending(
        &self,
        source_platform: &str,
        target_platform: &str,
        limit: i64,
    ) -> Result<Vec<String>, CatalogError> {
        let rows = sqlx::query(
            "SELECT fingerprint FROM sync_status
             WHERE source_platform = ? AND target_platform = ? AND status = 'pending'
             ORDER BY updated_at ASC LIMIT ?",
        )
        .bind(source_platform)
        .bind(target_platform)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("fingerprint")).collect())
    }

    // ---- file_cache ------------------------------------------------------

    pub async fn record_cache(
        &self,
        fingerprint: &str,
        file_format: &str,
        file_path: &str,
        file_size: i64,
    ) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO file_cache (fingerprint, file_format, file_path, file_size, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(fingerprint, file_format) DO UPDATE SET
                file_path = excluded.file_path,
                file_size = excluded.file_size,
                created_at = excluded.created_at",
        )
        .bind(fingerprint)
        .bind(file_format)
        .bind(file_path)
        .bind(file_size)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_cache(
        &self,
        fingerprint: &str,
        file_format: &str,
    ) -> Result<Option<CacheEntry>, CatalogError> {
        let row = sqlx::query(
            "SELECT fingerprint, file_format, file_path, file_size, created_at FROM file_cache
             WHERE fingerprint = ? AND file_format = ?",
        )
        .bind(fingerprint)
        .bind(file_format)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_cache_entry).transpose()
    }

    pub async fn list_cache_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Vec<CacheEntry>, CatalogError> {
        let rows = sqlx::query(
            "SELECT fingerprint, file_format, file_path, file_size, created_at FROM file_cache WHERE fingerprint = ?",
        )
        .bind(fingerprint)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_cache_entry).collect()
    }

    pub async fn list_all_cache_entries(&self) -> Result<Vec<CacheEntry>, CatalogError> {
        let rows = sqlx::query(
            "SELECT fingerprint, file_format, file_path, file_size, created_at FROM file_cache",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_cache_entry).collect()
    }

    pub async fn remove_cache_entry(
        &self,
        fingerprint: &str,
        file_format: &str,
    ) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM file_cache WHERE fingerprint = ? AND file_format = ?")
            .bind(fingerprint)
            .bind(file_format)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Remove entries older than `ttl` (spec §4.8 sweep policy). Returns
    /// the number of rows removed.
    pub async fn purge_cache(&self, ttl: ChronoDuration) -> Result<u64, CatalogError> {
        let cutoff = (Utc::now() - ttl).to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM file_cache WHERE created_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    // ---- api_limits ------------------------------------------------------

    pub async fn get_api(&self, platform: &str) -> Result<Option<ApiCounters>, CatalogError> {
        let row = sqlx::query(
            "SELECT daily_calls, quarter_hour_calls, daily_limit, quarter_hour_limit, day_reset_at, window_reset_at
             FROM api_limits WHERE platform = ?",
        )
        .bind(platform)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_api_counters).transpose()
    }

    pub async fn init_api_limits(
        &self,
        platform: &str,
        daily_limit: i64,
        quarter_hour_limit: i64,
    ) -> Result<(), CatalogError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO api_limits (platform, daily_calls, quarter_hour_calls, daily_limit, quarter_hour_limit, day_reset_at, window_reset_at)
             VALUES (?, 0, 0, ?, ?, ?, ?)
             ON CONFLICT(platform) DO UPDATE SET
                daily_limit = excluded.daily_limit,
                quarter_hour_limit = excluded.quarter_hour_limit",
        )
        .bind(platform)
        .bind(daily_limit)
        .bind(quarter_hour_limit)
        .bind((now + ChronoDuration::hours(24)).to_rfc3339())
        .bind((now + ChronoDuration::minutes(15)).to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Expire any window whose `reset_at` has passed, then increment both
    /// counters by `n` (spec §4.5: "lazy — on each reserve it first
    /// expires counters whose reset_at has passed").
    pub async fn bump_api(&self, platform: &str, n: i64) -> Result<ApiCounters, CatalogError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT daily_calls, quarter_hour_calls, daily_limit, quarter_hour_limit, day_reset_at, window_reset_at
             FROM api_limits WHERE platform = ?",
        )
        .bind(platform)
        .fetch_one(&mut *tx)
        .await?;
        let mut counters = row_to_api_counters(row)?;

        if now >= counters.day_reset_at {
            counters.daily_calls = 0;
            counters.day_reset_at = now + ChronoDuration::hours(24);
        }
        if now >= counters.window_reset_at {
            counters.quarter_hour_calls = 0;
            counters.window_reset_at = now + ChronoDuration::minutes(15);
        }
        counters.daily_calls += n;
        counters.quarter_hour_calls += n;

        sqlx::query(
            "UPDATE api_limits SET daily_calls = ?, quarter_hour_calls = ?, day_reset_at = ?, window_reset_at = ?
             WHERE platform = ?",
        )
        .bind(counters.daily_calls)
        .bind(counters.quarter_hour_calls)
        .bind(counters.day_reset_at.to_rfc3339())
        .bind(counters.window_reset_at.to_rfc3339())
        .bind(platform)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(counters)
    }

    pub async fn reset_api_window(&self, platform: &str) -> Result<(), CatalogError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE api_limits SET quarter_hour_calls = 0, window_reset_at = ? WHERE platform = ?",
        )
        .bind((now + ChronoDuration::minutes(15)).to_rfc3339())
        .bind(platform)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    // ---- sync_config -------------------------------------------------------

    pub async fn get_config(&self, key: &str) -> Result<Option<String>, CatalogError> {
        let row = sqlx::query("SELECT value FROM sync_config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn set_config(&self, key: &str, value: &str) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO sync_config (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// `last_cursor[platform]`, per spec §4.9 step 1 / step 8.
    pub async fn get_cursor(&self, platform: &str) -> Result<Option<DateTime<Utc>>, CatalogError> {
        let key = format!("cursor.{platform}");
        match self.get_config(&key).await? {
            Some(v) => Ok(Some(
                DateTime::parse_from_rfc3339(&v)
                    .map_err(|e| CatalogError::MalformedRow(e.to_string()))?
                    .with_timezone(&Utc),
            )),
            None => Ok(None),
        }
    }

    pub async fn set_cursor(&self, platform: &str, value: DateTime<Utc>) -> Result<(), CatalogError> {
        let key = format!("cursor.{platform}");
        self.set_config(&key, &value.to_rfc3339()).await
    }
}

fn row_to_activity(row: sqlx::sqlite::SqliteRow) -> Result<ActivityRecord, CatalogError> {
    let sport_tag: String = row.get("sport_type");
    let sport_type = parse_sport_tag(&sport_tag)?;
    Ok(ActivityRecord {
        fingerprint: row.get("fingerprint"),
        name: row.get("name"),
        sport_type,
        start_time: parse_rfc3339(row.get("start_time"))?,
        distance_m: row.get("distance_m"),
        duration_s: row.get("duration_s"),
        elevation_gain_m: row.get("elevation_gain_m"),
        created_at: parse_rfc3339(row.get("created_at"))?,
        updated_at: parse_rfc3339(row.get("updated_at"))?,
    })
}

fn row_to_mapping(row: sqlx::sqlite::SqliteRow) -> Result<PlatformMapping, CatalogError> {
    Ok(PlatformMapping {
        fingerprint: row.get("fingerprint"),
        platform: row.get("platform"),
        platform_activity_id: row.get("platform_activity_id"),
        created_at: parse_rfc3339(row.get("created_at"))?,
    })
}

fn row_to_cache_entry(row: sqlx::sqlite::SqliteRow) -> Result<CacheEntry, CatalogError> {
    Ok(CacheEntry {
        fingerprint: row.get("fingerprint"),
        file_format: row.get("file_format"),
        file_path: row.get("file_path"),
        file_size: row.get("file_size"),
        created_at: parse_rfc3339(row.get("created_at"))?,
    })
}

fn row_to_api_counters(row: sqlx::sqlite::SqliteRow) -> Result<ApiCounters, CatalogError> {
    Ok(ApiCounters {
        daily_calls: row.get("daily_calls"),
        quarter_hour_calls: row.get("quarter_hour_calls"),
        daily_limit: row.get("daily_limit"),
        quarter_hour_limit: row.get("quarter_hour_limit"),
        day_reset_at: parse_rfc3339(row.get("day_reset_at"))?,
        window_reset_at: parse_rfc3339(row.get("window_reset_at"))?,
    })
}

fn parse_rfc3339(value: String) -> Result<DateTime<Utc>, CatalogError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CatalogError::MalformedRow(e.to_string()))
}

fn parse_sport_tag(tag: &str) -> Result<SportType, CatalogError> {
    match tag {
        "ride" => Ok(SportType::Ride),
        "run" => Ok(SportType::Run),
        "swim" => Ok(SportType::Swim),
        "walk" => Ok(SportType::Walk),
        "hike" => Ok(SportType::Hike),
        "virtual_ride" => Ok(SportType::VirtualRide),
        "other" => Ok(SportType::Other),
        other => Err(CatalogError::MalformedRow(format!(
            "unknown sport_type {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitsync_core::sport::SportType;

    fn sample_activity(fingerprint: &str) -> ActivityRecord {
        let now = Utc::now();
        ActivityRecord {
            fingerprint: fingerprint.to_string(),
            name: "Morning Ride".to_string(),
            sport_type: SportType::Ride,
            start_time: now,
            distance_m: 20000.0,
            duration_s: 3600,
            elevation_gain_m: Some(120.0),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn upsert_activity_is_idempotent() {
        let store = CatalogStore::open_in_memory().await.unwrap();
        let activity = sample_activity("fp1");
        store.upsert_activity(&activity).await.unwrap();
        store.upsert_activity(&activity).await.unwrap();
        let fetched = store.get_activity("fp1").await.unwrap().unwrap();
        assert_eq!(fetched.name, "Morning Ride");
    }

    #[tokio::test]
    async fn mapping_round_trips() {
        let store = CatalogStore::open_in_memory().await.unwrap();
        store.upsert_activity(&sample_activity("fp1")).await.unwrap();
        store.record_mapping("fp1", "strava", "S1").await.unwrap();
        assert_eq!(
            store.get_mapping("fp1", "strava").await.unwrap(),
            Some("S1".to_string())
        );
        assert_eq!(
            store.get_mappings_by_platform_id("strava", "S1").await.unwrap(),
            Some("fp1".to_string())
        );
    }

    #[tokio::test]
    async fn status_never_regresses_from_synced() {
        let store = CatalogStore::open_in_memory().await.unwrap();
        store.upsert_activity(&sample_activity("fp1")).await.unwrap();
        store
            .set_status("fp1", "strava", "garmin", &SyncStatusValue::Synced)
            .await
            .unwrap();
        let result = store
            .set_status("fp1", "strava", "garmin", &SyncStatusValue::Pending)
            .await;
        assert!(result.is_err());
        assert_eq!(
            store.get_status("fp1", "strava", "garmin").await.unwrap(),
            Some(SyncStatusValue::Synced)
        );
    }

    #[tokio::test]
    async fn set_status_twice_is_a_no_op() {
        let store = CatalogStore::open_in_memory().await.unwrap();
        store.upsert_activity(&sample_activity("fp1")).await.unwrap();
        store
            .set_status("fp1", "strava", "garmin", &SyncStatusValue::Synced)
            .await
            .unwrap();
        store
            .set_status("fp1", "strava", "garmin", &SyncStatusValue::Synced)
            .await
            .unwrap();
        assert_eq!(
            store.get_status("fp1", "strava", "garmin").await.unwrap(),
            Some(SyncStatusValue::Synced)
        );
    }

    #[tokio::test]
    async fn cache_round_trips_then_purges() {
        let store = CatalogStore::open_in_memory().await.unwrap();
        store.record_cache("fp1", "fit", "/tmp/fp1.fit", 1024).await.unwrap();
        let entry = store.get_cache("fp1", "fit").await.unwrap().unwrap();
        assert_eq!(entry.file_path, "/tmp/fp1.fit");
        let removed = store.purge_cache(ChronoDuration::zero()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_cache("fp1", "fit").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn api_reservation_boundary() {
        let store = CatalogStore::open_in_memory().await.unwrap();
        store.init_api_limits("strava", 200, 2).await.unwrap();
        let first = store.bump_api("strava", 1).await.unwrap();
        assert_eq!(first.quarter_hour_calls, 1);
        let second = store.bump_api("strava", 1).await.unwrap();
        assert_eq!(second.quarter_hour_calls, 2);
        assert_eq!(second.quarter_hour_calls, second.quarter_hour_limit);
    }

    #[tokio::test]
    async fn transient_failure_retries_then_gives_up() {
        let store = CatalogStore::open_in_memory().await.unwrap();
        store.upsert_activity(&sample_activity("fp1")).await.unwrap();
        for _ in 0..3 {
            let status = store
                .record_transient_failure("fp1", "strava", "garmin", 3, "transport")
                .await
                .unwrap();
            assert_eq!(status, SyncStatusValue::Pending);
        }
        let status = store
            .record_transient_failure("fp1", "strava", "garmin", 3, "transport")
            .await
            .unwrap();
        assert_eq!(status, SyncStatusValue::Failed("transport".to_string()));
    }

    #[tokio::test]
    async fn cursor_round_trips() {
        let store = CatalogStore::open_in_memory().await.unwrap();
        assert!(store.get_cursor("strava").await.unwrap().is_none());
        let now = Utc::now();
        store.set_cursor("strava", now).await.unwrap();
        let fetched = store.get_cursor("strava").await.unwrap().unwrap();
        assert_eq!(fetched.timestamp(), now.timestamp());
    }
}
