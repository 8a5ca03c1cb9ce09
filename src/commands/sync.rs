use std::sync::Arc;

use anyhow::Result;
use chrono::Duration as ChronoDuration;
use fitsync_cache::{BestEffortTranscoder, FileCache};
use fitsync_catalog::CatalogStore;
use fitsync_executor::{Direction, ExecutorConfig, SyncExecutor};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{adapters, cli::SyncArgs, config::AppConfig};

/// Exit codes per spec §6: 0 success, 1 operational failure, 2 usage
/// error, 3 rate-limited stop with partial progress committed.
pub async fn run(args: SyncArgs, mut config: AppConfig) -> Result<i32> {
    if let Some(platform) = args.clear_session.as_deref() {
        config.clear_session(platform)?;
        config.save()?;
        println!("cleared session for {}", platform);
        return Ok(0);
    }

    let directions = resolve_directions(&args, &config)?;
    if directions.is_empty() {
        eprintln!("no directions given: pass --directions or --auto with enabled_directions configured");
        return Ok(2);
    }

    let registry = adapters::build_registry(&config)?;
    for direction in &directions {
        if registry.get(&direction.source).is_none() || registry.get(&direction.destination).is_none() {
            eprintln!("direction {} names a platform with no configured credentials", direction);
            return Ok(2);
        }
    }

    let catalog = CatalogStore::open(config.database_path()).await?;

    if args.status {
        print_status(&catalog, &directions).await?;
        return Ok(0);
    }

    let cache = Arc::new(FileCache::new(
        config.cache_dir(),
        catalog.clone(),
        registry.clone(),
        Arc::new(BestEffortTranscoder),
        ChronoDuration::days(config.tunables.cache_ttl_days),
    ));

    if args.cleanup_cache {
        let removed = cache.sweep().await?;
        info!("cache sweep removed {} entries", removed);
    }

    let executor_config = ExecutorConfig {
        batch_size: args.batch_size,
        migration_mode: args.migration_mode,
        ..ExecutorConfig::default()
    };

    let executor = SyncExecutor::new(registry, catalog, cache, adapters::budgets(&config), executor_config);
    let cancel = CancellationToken::new();

    let mut rate_limited = false;
    let mut operational_failure = false;

    for direction in &directions {
        match executor.run_direction(direction, &cancel).await {
            Ok(outcome) => {
                println!(
                    "{}: processed={} synced={} duplicate={} skipped={} failed={} pending_retry={}",
                    outcome.direction,
                    outcome.processed,
                    outcome.synced,
                    outcome.duplicate,
                    outcome.skipped,
                    outcome.failed,
                    outcome.pending_retry
                );
            }
            Err(err) if matches!(err, fitsync_core::SyncError::RateLimited { .. }) => {
                warn!("{} stopped: {}", direction, err);
                rate_limited = true;
            }
            Err(err) if matches!(err, fitsync_core::SyncError::CatalogCorruption(_)) => {
                error!("aborting invocation: {}", err);
                return Err(err.into());
            }
            Err(err) => {
                error!("{} halted: {}", direction, err);
                operational_failure = true;
            }
        }
    }

    if rate_limited {
        Ok(3)
    } else if operational_failure {
        Ok(1)
    } else {
        Ok(0)
    }
}

fn resolve_directions(args: &SyncArgs, config: &AppConfig) -> Result<Vec<Direction>> {
    if !args.directions.is_empty() {
        return Ok(args.directions.clone());
    }
    if args.auto {
        return config
            .enabled_directions
            .iter()
            .map(|d| d.parse::<Direction>().map_err(Into::into))
            .collect();
    }
    Ok(Vec::new())
}

async fn print_status(catalog: &CatalogStore, directions: &[Direction]) -> Result<()> {
    for direction in directions {
        let cursor = catalog.get_cursor(&direction.source).await?;
        let pending = catalog
            .list_pending(&direction.source, &direction.destination, i64::MAX)
            .await?;
        println!(
            "{}: cursor={} pending={}",
            direction,
            cursor.map(|c| c.to_rfc3339()).unwrap_or_else(|| "none".to_string()),
            pending.len()
        );
    }
    Ok(())
}
