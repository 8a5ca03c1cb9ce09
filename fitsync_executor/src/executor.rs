//! The Sync Executor (spec §4.9): one instance drives the eight-step
//! reconcile loop for every enabled direction, in order, sequentially.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fitsync_adapters::{AdapterRegistry, FileFormat, ListedActivity, PlatformAdapter, UploadMetadata, UploadOutcome};
use fitsync_cache::FileCache;
use fitsync_catalog::{CatalogError, CatalogStore, SyncStatusValue};
use fitsync_core::{error::SyncError, fingerprint, sport, ActivityRecord};
use fitsync_governor::{Governor, PlatformBudget, Reservation};
use log::{info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::direction::Direction;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub batch_size: usize,
    pub max_retries: i64,
    pub window_default: ChronoDuration,
    pub window_overlap: ChronoDuration,
    pub operation_timeout: StdDuration,
    /// Lifts the default 30-day window cap when no cursor is recorded yet
    /// (spec §4.9 step 1, invoked via `--migration-mode`, spec §6).
    pub migration_mode: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_retries: 3,
            window_default: ChronoDuration::days(30),
            window_overlap: ChronoDuration::hours(1),
            operation_timeout: StdDuration::from_secs(30),
            migration_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectionOutcome {
    pub direction: Direction,
    pub processed: usize,
    pub synced: usize,
    pub duplicate: usize,
    pub skipped: usize,
    pub failed: usize,
    pub pending_retry: usize,
    pub cursor_advanced_to: Option<DateTime<Utc>>,
}

impl DirectionOutcome {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            processed: 0,
            synced: 0,
            duplicate: 0,
            skipped: 0,
            failed: 0,
            pending_retry: 0,
            cursor_advanced_to: None,
        }
    }

    fn record(&mut self, status: &SyncStatusValue) {
        match status {
            SyncStatusValue::Synced => self.synced += 1,
            SyncStatusValue::Duplicate => self.duplicate += 1,
            SyncStatusValue::Skipped(_) => self.skipped += 1,
            SyncStatusValue::Failed(_) => self.failed += 1,
            SyncStatusValue::Pending => self.pending_retry += 1,
        }
    }
}

pub struct SyncExecutor {
    registry: AdapterRegistry,
    catalog: CatalogStore,
    cache: Arc<FileCache>,
    budgets: HashMap<String, PlatformBudget>,
    config: ExecutorConfig,
}

impl SyncExecutor {
    pub fn new(
        registry: AdapterRegistry,
        catalog: CatalogStore,
        cache: Arc<FileCache>,
        budgets: HashMap<String, PlatformBudget>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            catalog,
            cache,
            budgets,
            config,
        }
    }

    fn budget_for(&self, platform: &str) -> PlatformBudget {
        self.budgets
            .get(platform)
            .copied()
            .unwrap_or_else(PlatformBudget::generous_default)
    }

    async fn reserve(&self, platform: &str, cost: i64) -> Result<(), SyncError> {
        let governor = Governor::new(&self.catalog);
        let budget = self.budget_for(platform);
        match governor
            .reserve(platform, &budget, cost)
            .await
            .map_err(catalog_corruption)?
        {
            Reservation::Granted => Ok(()),
            Reservation::Denied { retry_after } => Err(SyncError::RateLimited {
                platform: platform.to_string(),
                retry_after,
            }),
        }
    }

    async fn window_start(&self, source: &str) -> Result<DateTime<Utc>, SyncError> {
        match self.catalog.get_cursor(source).await.map_err(catalog_corruption)? {
            Some(cursor) => Ok(cursor - self.config.window_overlap),
            None if self.config.migration_mode => Ok(DateTime::<Utc>::MIN_UTC),
            None => Ok(Utc::now() - self.config.window_default),
        }
    }

    /// Run one `src -> dst` direction to completion (or until the batch
    /// size, governor denial, or cancellation cuts it short), advancing
    /// the source's cursor to the last successfully processed
    /// `start_time` (spec §4.9 step 8).
    pub async fn run_direction(
        &self,
        direction: &Direction,
        cancel: &CancellationToken,
    ) -> Result<DirectionOutcome, SyncError> {
        let source_adapter = self.registry.get(&direction.source).ok_or_else(|| SyncError::Transport {
            platform: direction.source.clone(),
            message: "no adapter registered for this platform".to_string(),
        })?;
        let dest_adapter = self.registry.get(&direction.destination).ok_or_else(|| SyncError::Transport {
            platform: direction.destination.clone(),
            message: "no adapter registered for this platform".to_string(),
        })?;

        let window_start = self.window_start(&direction.source).await?;
        self.reserve(&direction.source, source_adapter.info().api_cost_per_list).await?;

        let mut listed = with_timeout(
            self.config.operation_timeout,
            source_adapter.list_activities(window_start, self.config.batch_size),
        )
        .await?;
        listed.sort_by_key(|a| a.start_time);
        listed.truncate(self.config.batch_size);

        let mut outcome = DirectionOutcome::new(direction.clone());

        let mut rate_limited = None;

        for activity in &listed {
            if cancel.is_cancelled() {
                warn!("direction {direction} cancelled after {} activities", outcome.processed);
                break;
            }
            match self
                .process_one(direction, source_adapter.as_ref(), dest_adapter.as_ref(), activity)
                .await
            {
                Ok(status) => {
                    outcome.record(&status);
                    outcome.processed += 1;
                    outcome.cursor_advanced_to = Some(activity.start_time);
                }
                Err(err @ SyncError::RateLimited { .. }) => {
                    // The governor denied a reservation mid-batch (spec §4.9
                    // step 8, scenario 5): commit the cursor through the last
                    // activity that did complete, then surface the signal so
                    // the driver exits 3 instead of silently re-listing the
                    // whole window next run.
                    warn!("direction {direction} rate limited after {} activities", outcome.processed);
                    rate_limited = Some(err);
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        if let Some(last) = outcome.cursor_advanced_to {
            self.catalog
                .set_cursor(&direction.source, last)
                .await
                .map_err(catalog_corruption)?;
        }

        info!(
            "direction {direction}: processed {} (synced {}, duplicate {}, skipped {}, failed {}, pending {})",
            outcome.processed, outcome.synced, outcome.duplicate, outcome.skipped, outcome.failed, outcome.pending_retry
        );

        if let Some(err) = rate_limited {
            return Err(err);
        }
        Ok(outcome)
    }

    /// Steps 3-7 of spec §4.9 for a single listed activity. Returns the
    /// terminal (or retry-pending) status; only direction-fatal errors
    /// (`Unauthorized`, `RateLimited`) and `CatalogCorruption` escape as
    /// `Err` — everything activity-local is folded into a status.
    async fn process_one(
        &self,
        direction: &Direction,
        source: &dyn PlatformAdapter,
        dest: &dyn PlatformAdapter,
        listed: &ListedActivity,
    ) -> Result<SyncStatusValue, SyncError> {
        let sport_type = sport::normalize(&listed.raw_sport_type);
        let fp = fingerprint::compute(sport_type, listed.start_time, listed.distance_m, listed.duration_s);

        let mut record = ActivityRecord::new(
            listed.name.clone(),
            sport_type,
            listed.start_time,
            listed.distance_m,
            listed.duration_s,
            listed.elevation_gain_m,
        );
        record.fingerprint = fp.clone();
        self.catalog.upsert_activity(&record).await.map_err(catalog_corruption)?;
        self.catalog
            .record_mapping(&fp, &direction.source, &listed.platform_activity_id)
            .await
            .map_err(catalog_corruption)?;

        if let Some(existing) = self
            .catalog
            .get_status(&fp, &direction.source, &direction.destination)
            .await
            .map_err(catalog_corruption)?
        {
            if matches!(existing, SyncStatusValue::Synced | SyncStatusValue::Duplicate | SyncStatusValue::Skipped(_)) {
                return Ok(existing);
            }
        }

        if listed.is_manual {
            return self.finalize(&fp, direction, SyncStatusValue::Skipped("no_source_file".to_string())).await;
        }

        if self
            .catalog
            .get_mapping(&fp, &direction.destination)
            .await
            .map_err(catalog_corruption)?
            .is_some()
        {
            return self.finalize(&fp, direction, SyncStatusValue::Synced).await;
        }

        let Some(chosen_format) =
            choose_transfer_format(&listed.available_formats, &dest.supported_upload_formats(), dest.name())
        else {
            return self.finalize(&fp, direction, SyncStatusValue::Failed("no_compatible_format".to_string())).await;
        };

        self.reserve(&direction.source, source.info().api_cost_per_download).await?;

        let file_path = match self.cache.ensure_file(&fp, chosen_format).await {
            Ok(path) => path,
            Err(err) => return self.handle_activity_error(&fp, direction, err).await,
        };
        let bytes = tokio::fs::read(&file_path).await?;

        self.reserve(&direction.destination, dest.info().api_cost_per_upload).await?;

        let metadata = UploadMetadata {
            name: listed.name.clone(),
            raw_sport_type: listed.raw_sport_type.clone(),
            start_time: listed.start_time,
            distance_m: listed.distance_m,
            duration_s: listed.duration_s,
            elevation_gain_m: listed.elevation_gain_m,
        };

        let upload = with_timeout(self.config.operation_timeout, dest.upload(&bytes, chosen_format, &metadata)).await;

        match upload {
            Ok(UploadOutcome::Accepted { remote_id }) => {
                self.catalog
                    .record_mapping(&fp, &direction.destination, &remote_id)
                    .await
                    .map_err(catalog_corruption)?;
                self.finalize(&fp, direction, SyncStatusValue::Synced).await
            }
            Ok(UploadOutcome::Duplicate) => self.finalize(&fp, direction, SyncStatusValue::Duplicate).await,
            Ok(UploadOutcome::Rejected { reason }) => self.finalize(&fp, direction, SyncStatusValue::Failed(reason)).await,
            Ok(UploadOutcome::TransientError) => self
                .catalog
                .record_transient_failure(&fp, &direction.source, &direction.destination, self.config.max_retries, "transient_error")
                .await
                .map_err(catalog_corruption),
            Err(err) => self.handle_activity_error(&fp, direction, err).await,
        }
    }

    async fn finalize(
        &self,
        fingerprint: &str,
        direction: &Direction,
        status: SyncStatusValue,
    ) -> Result<SyncStatusValue, SyncError> {
        self.catalog
            .set_status(fingerprint, &direction.source, &direction.destination, &status)
            .await
            .map_err(catalog_corruption)?;
        Ok(status)
    }

    /// Dispatch per spec §7's error table. `Transport`/timeout goes
    /// through the same retry counter as an `UploadOutcome::TransientError`
    /// rather than failing on the first hiccup; everything else here is
    /// either immediately terminal or (`Unauthorized`, `RateLimited`,
    /// `CatalogCorruption`, `Io`) propagated to halt the direction.
    async fn handle_activity_error(
        &self,
        fingerprint: &str,
        direction: &Direction,
        err: SyncError,
    ) -> Result<SyncStatusValue, SyncError> {
        match err {
            SyncError::NoOriginalFile => {
                self.finalize(fingerprint, direction, SyncStatusValue::Skipped("no_source_file".to_string())).await
            }
            SyncError::NotFound { .. } => {
                self.finalize(fingerprint, direction, SyncStatusValue::Failed("not_found".to_string())).await
            }
            SyncError::Validation(message) => {
                self.finalize(fingerprint, direction, SyncStatusValue::Failed(format!("validation: {message}"))).await
            }
            SyncError::UnsupportedConversion { from, to } => {
                self.finalize(
                    fingerprint,
                    direction,
                    SyncStatusValue::Failed(format!("unsupported_conversion: {from}->{to}")),
                )
                .await
            }
            SyncError::Duplicate => self.finalize(fingerprint, direction, SyncStatusValue::Duplicate).await,
            SyncError::Transport { platform, message } => self
                .catalog
                .record_transient_failure(
                    fingerprint,
                    &direction.source,
                    &direction.destination,
                    self.config.max_retries,
                    &format!("transport: {platform}: {message}"),
                )
                .await
                .map_err(catalog_corruption),
            other => Err(other),
        }
    }
}

/// Intersection of what the source can hand over and what the
/// destination accepts, ordered FIT > TCX > GPX unless the destination
/// is known to prefer otherwise (OneDrive wants GPX for its
/// Fog-of-World use case, spec §4.9 step 5).
fn choose_transfer_format(available: &[FileFormat], supported: &[FileFormat], dest_name: &str) -> Option<FileFormat> {
    let mut candidates: Vec<FileFormat> = available.iter().filter(|f| supported.contains(f)).copied().collect();
    if dest_name == "onedrive" {
        candidates.sort_by_key(|f| if *f == FileFormat::Gpx { 0 } else { 1 });
    } else {
        candidates.sort_by_key(|f| f.default_preference_rank());
    }
    candidates.into_iter().next()
}

async fn with_timeout<F, T>(duration: StdDuration, fut: F) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, SyncError>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Transport {
            platform: "timeout".to_string(),
            message: "operation exceeded its configured timeout".to_string(),
        }),
    }
}

fn catalog_corruption(err: CatalogError) -> SyncError {
    SyncError::CatalogCorruption(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use fitsync_adapters::{PlatformHealth, PlatformInfo};
    use fitsync_cache::BestEffortTranscoder;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    struct FakeSource {
        activities: Vec<ListedActivity>,
    }

    #[async_trait]
    impl PlatformAdapter for FakeSource {
        fn name(&self) -> &'static str {
            "fake_source"
        }
        async fn list_activities(&self, _since: DateTime<Utc>, _limit: usize) -> Result<Vec<ListedActivity>, SyncError> {
            Ok(self.activities.clone())
        }
        async fn download(&self, _id: &str, _preferred: FileFormat) -> Result<(Vec<u8>, FileFormat), SyncError> {
            Ok((b"fake-bytes".to_vec(), FileFormat::Fit))
        }
        async fn upload(&self, _bytes: &[u8], _format: FileFormat, _metadata: &UploadMetadata) -> Result<UploadOutcome, SyncError> {
            unreachable!("fake source is never a destination in these tests")
        }
        fn supported_upload_formats(&self) -> Vec<FileFormat> {
            vec![FileFormat::Fit]
        }
        fn info(&self) -> PlatformInfo {
            PlatformInfo { platform_name: "fake_source", api_cost_per_list: 1, api_cost_per_download: 1, api_cost_per_upload: 1 }
        }
        async fn health_check(&self) -> PlatformHealth {
            PlatformHealth::Ok
        }
    }

    struct FakeDest {
        outcome: StdMutex<UploadOutcome>,
    }

    #[async_trait]
    impl PlatformAdapter for FakeDest {
        fn name(&self) -> &'static str {
            "fake_dest"
        }
        async fn list_activities(&self, _since: DateTime<Utc>, _limit: usize) -> Result<Vec<ListedActivity>, SyncError> {
            Ok(Vec::new())
        }
        async fn download(&self, _id: &str, _preferred: FileFormat) -> Result<(Vec<u8>, FileFormat), SyncError> {
            Err(SyncError::NotFound { platform: "fake_dest".to_string() })
        }
        async fn upload(&self, _bytes: &[u8], _format: FileFormat, _metadata: &UploadMetadata) -> Result<UploadOutcome, SyncError> {
            Ok(self.outcome.lock().unwrap().clone())
        }
        fn supported_upload_formats(&self) -> Vec<FileFormat> {
            vec![FileFormat::Fit]
        }
        fn info(&self) -> PlatformInfo {
            PlatformInfo { platform_name: "fake_dest", api_cost_per_list: 1, api_cost_per_download: 1, api_cost_per_upload: 1 }
        }
        async fn health_check(&self) -> PlatformHealth {
            PlatformHealth::Ok
        }
    }

    fn sample_listed(start: DateTime<Utc>) -> ListedActivity {
        ListedActivity {
            platform_activity_id: "src-1".to_string(),
            name: "Morning Ride".to_string(),
            raw_sport_type: "ride".to_string(),
            start_time: start,
            distance_m: 20000.0,
            duration_s: 3600,
            elevation_gain_m: Some(100.0),
            available_formats: vec![FileFormat::Fit],
            is_manual: false,
        }
    }

    async fn build_executor(dest_outcome: UploadOutcome) -> (SyncExecutor, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let catalog = CatalogStore::open_in_memory().await.unwrap();
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(FakeSource {
            activities: vec![sample_listed(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap())],
        }));
        registry.register(Arc::new(FakeDest { outcome: StdMutex::new(dest_outcome) }));

        let cache = Arc::new(FileCache::new(
            dir.path(),
            catalog.clone(),
            registry.clone(),
            Arc::new(BestEffortTranscoder),
            ChronoDuration::days(30),
        ));

        let executor = SyncExecutor::new(registry, catalog, cache, HashMap::new(), ExecutorConfig::default());
        (executor, dir)
    }

    #[tokio::test]
    async fn fresh_sync_marks_synced_and_advances_cursor() {
        let (executor, _dir) = build_executor(UploadOutcome::Accepted { remote_id: "dst-1".to_string() }).await;
        let direction = Direction::new("fake_source", "fake_dest");
        let outcome = executor.run_direction(&direction, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.synced, 1);
        assert_eq!(outcome.processed, 1);
        assert!(outcome.cursor_advanced_to.is_some());
    }

    #[tokio::test]
    async fn rerun_is_idempotent_via_mapping_shortcut() {
        let (executor, _dir) = build_executor(UploadOutcome::Accepted { remote_id: "dst-1".to_string() }).await;
        let direction = Direction::new("fake_source", "fake_dest");
        executor.run_direction(&direction, &CancellationToken::new()).await.unwrap();
        let second = executor.run_direction(&direction, &CancellationToken::new()).await.unwrap();
        // status is already terminal, so the second pass short-circuits at step 4.
        assert_eq!(second.synced, 1);
    }

    #[tokio::test]
    async fn duplicate_destination_is_terminal_success() {
        let (executor, _dir) = build_executor(UploadOutcome::Duplicate).await;
        let direction = Direction::new("fake_source", "fake_dest");
        let outcome = executor.run_direction(&direction, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.duplicate, 1);
    }

    #[tokio::test]
    async fn transient_error_stays_pending_for_retry() {
        let (executor, _dir) = build_executor(UploadOutcome::TransientError).await;
        let direction = Direction::new("fake_source", "fake_dest");
        let outcome = executor.run_direction(&direction, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.pending_retry, 1);
    }

    #[tokio::test]
    async fn rate_limit_mid_batch_commits_cursor_through_last_success_and_signals_caller() {
        let dir = tempdir().unwrap();
        let catalog = CatalogStore::open_in_memory().await.unwrap();
        let mut registry = AdapterRegistry::new();
        let first = sample_listed(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap());
        let second = sample_listed(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap());
        let second_start = second.start_time;
        registry.register(Arc::new(FakeSource { activities: vec![first, second] }));
        registry.register(Arc::new(FakeDest {
            outcome: StdMutex::new(UploadOutcome::Accepted { remote_id: "dst-1".to_string() }),
        }));
        let cache = Arc::new(FileCache::new(
            dir.path(),
            catalog.clone(),
            registry.clone(),
            Arc::new(BestEffortTranscoder),
            ChronoDuration::days(30),
        ));

        // One list call plus one download call exhausts the source's
        // quarter-hour budget, so the second activity's download
        // reservation is denied mid-batch (spec §4.9 scenario 5).
        let mut budgets = HashMap::new();
        budgets.insert(
            "fake_source".to_string(),
            PlatformBudget {
                daily_cap: 1_000,
                daily_margin: 0,
                quarter_hour_cap: 2,
                quarter_hour_margin: 0,
            },
        );

        let executor = SyncExecutor::new(registry, catalog.clone(), cache, budgets, ExecutorConfig::default());
        let direction = Direction::new("fake_source", "fake_dest");
        let err = executor
            .run_direction(&direction, &CancellationToken::new())
            .await
            .expect_err("second activity's reservation should be denied");
        assert!(matches!(err, SyncError::RateLimited { .. }));

        let cursor = catalog.get_cursor("fake_source").await.unwrap();
        assert!(cursor.is_some(), "cursor must commit through the last successfully processed activity");
        assert!(cursor.unwrap() < second_start, "cursor must not advance past the activity that hit the limit");
    }

    #[tokio::test]
    async fn manual_activity_is_skipped_without_upload_attempt() {
        let dir = tempdir().unwrap();
        let catalog = CatalogStore::open_in_memory().await.unwrap();
        let mut registry = AdapterRegistry::new();
        let mut manual = sample_listed(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap());
        manual.is_manual = true;
        registry.register(Arc::new(FakeSource { activities: vec![manual] }));
        registry.register(Arc::new(FakeDest { outcome: StdMutex::new(UploadOutcome::TransientError) }));
        let cache = Arc::new(FileCache::new(
            dir.path(),
            catalog.clone(),
            registry.clone(),
            Arc::new(BestEffortTranscoder),
            ChronoDuration::days(30),
        ));
        let executor = SyncExecutor::new(registry, catalog, cache, HashMap::new(), ExecutorConfig::default());
        let direction = Direction::new("fake_source", "fake_dest");
        let outcome = executor.run_direction(&direction, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.skipped, 1);
    }
}
