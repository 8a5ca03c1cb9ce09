//! Content-addressed local file cache (spec §4.8): `cache_dir /
//! fingerprint.format`. The cache is advisory — every row here mirrors a
//! file on disk, and losing either half just forces a re-download, never
//! a catalog inconsistency.

use std::{path::PathBuf, sync::Arc};

use chrono::Duration as ChronoDuration;
use dashmap::DashMap;
use fitsync_adapters::{AdapterRegistry, FileFormat};
use fitsync_catalog::{CacheEntry, CatalogError, CatalogStore};
use fitsync_core::error::SyncError;
use log::{debug, warn};
use tokio::sync::Mutex as AsyncMutex;

use crate::transcoder::Transcoder;

pub struct FileCache {
    cache_dir: PathBuf,
    store: CatalogStore,
    registry: AdapterRegistry,
    transcoder: Arc<dyn Transcoder>,
    ttl: ChronoDuration,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl FileCache {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        store: CatalogStore,
        registry: AdapterRegistry,
        transcoder: Arc<dyn Transcoder>,
        ttl: ChronoDuration,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            store,
            registry,
            transcoder,
            ttl,
            locks: DashMap::new(),
        }
    }

    fn path_for(&self, fingerprint: &str, format: FileFormat) -> PathBuf {
        self.cache_dir.join(format!("{fingerprint}.{}", format.extension()))
    }

    fn lock_for(&self, fingerprint: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(fingerprint.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// The three-step fallback from spec §4.8: cache hit, then transcode
    /// from a cached alternate format, then download-and-optionally-
    /// transcode from a source platform the catalog already maps this
    /// fingerprint to.
    pub async fn ensure_file(
        &self,
        fingerprint: &str,
        required_format: FileFormat,
    ) -> Result<PathBuf, SyncError> {
        let guard = self.lock_for(fingerprint);
        let _permit = guard.lock().await;

        if let Some(path) = self.cached_path(fingerprint, required_format).await? {
            return Ok(path);
        }

        if let Some(path) = self.transcode_from_alternate(fingerprint, required_format).await? {
            return Ok(path);
        }

        self.download_and_register(fingerprint, required_format).await
    }

    async fn cached_path(
        &self,
        fingerprint: &str,
        format: FileFormat,
    ) -> Result<Option<PathBuf>, SyncError> {
        let entry = self
            .store
            .get_cache(fingerprint, format.extension())
            .await
            .map_err(catalog_corruption)?;
        let Some(entry) = entry else { return Ok(None) };
        let path = PathBuf::from(&entry.file_path);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }

    async fn transcode_from_alternate(
        &self,
        fingerprint: &str,
        required_format: FileFormat,
    ) -> Result<Option<PathBuf>, SyncError> {
        let entries = self
            .store
            .list_cache_by_fingerprint(fingerprint)
            .await
            .map_err(catalog_corruption)?;

        for entry in entries {
            let Some(source_format) = parse_format(&entry.file_format) else { continue };
            if !self.transcoder.supports(source_format, required_format) {
                continue;
            }
            let source_path = PathBuf::from(&entry.file_path);
            let Ok(bytes) = tokio::fs::read(&source_path).await else { continue };
            let converted = self.transcoder.convert(&bytes, source_format, required_format)?;
            let dest = self.path_for(fingerprint, required_format);
            self.write_and_register(fingerprint, required_format, &dest, &converted).await?;
            return Ok(Some(dest));
        }
        Ok(None)
    }

    async fn download_and_register(
        &self,
        fingerprint: &str,
        required_format: FileFormat,
    ) -> Result<PathBuf, SyncError> {
        let mappings = self
            .store
            .list_mappings(fingerprint)
            .await
            .map_err(catalog_corruption)?;

        for mapping in mappings {
            let Some(adapter) = self.registry.get(&mapping.platform) else {
                continue;
            };
            let (bytes, actual_format) = adapter
                .download(&mapping.platform_activity_id, required_format)
                .await?;

            let raw_path = self.path_for(fingerprint, actual_format);
            self.write_and_register(fingerprint, actual_format, &raw_path, &bytes).await?;

            if actual_format == required_format {
                return Ok(raw_path);
            }
            if self.transcoder.supports(actual_format, required_format) {
                let converted = self.transcoder.convert(&bytes, actual_format, required_format)?;
                let dest = self.path_for(fingerprint, required_format);
                self.write_and_register(fingerprint, required_format, &dest, &converted).await?;
                return Ok(dest);
            }
            return Err(SyncError::UnsupportedConversion {
                from: actual_format.extension().to_string(),
                to: required_format.extension().to_string(),
            });
        }

        Err(SyncError::NoOriginalFile)
    }

    async fn write_and_register(
        &self,
        fingerprint: &str,
        format: FileFormat,
        path: &PathBuf,
        bytes: &[u8],
    ) -> Result<(), SyncError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        self.store
            .record_cache(fingerprint, format.extension(), &path.to_string_lossy(), bytes.len() as i64)
            .await
            .map_err(catalog_corruption)?;
        Ok(())
    }

    /// Sweep policy (spec §4.8): remove rows past `ttl`, then remove rows
    /// whose file is missing on disk. Run on startup and on demand.
    pub async fn sweep(&self) -> Result<u64, SyncError> {
        let mut removed = self.store.purge_cache(self.ttl).await.map_err(catalog_corruption)?;
        removed += self.remove_dangling().await?;
        Ok(removed)
    }

    async fn remove_dangling(&self) -> Result<u64, SyncError> {
        let entries: Vec<CacheEntry> = self
            .store
            .list_all_cache_entries()
            .await
            .map_err(catalog_corruption)?;
        let mut removed = 0;
        for entry in entries {
            let exists = tokio::fs::try_exists(&entry.file_path).await.unwrap_or(false);
            if !exists {
                warn!("dropping dangling cache entry {}.{}", entry.fingerprint, entry.file_format);
                self.store
                    .remove_cache_entry(&entry.fingerprint, &entry.file_format)
                    .await
                    .map_err(catalog_corruption)?;
                removed += 1;
            }
        }
        debug!("sweep removed {removed} dangling entries");
        Ok(removed)
    }
}

fn parse_format(tag: &str) -> Option<FileFormat> {
    match tag {
        "fit" => Some(FileFormat::Fit),
        "tcx" => Some(FileFormat::Tcx),
        "gpx" => Some(FileFormat::Gpx),
        _ => None,
    }
}

fn catalog_corruption(err: CatalogError) -> SyncError {
    SyncError::CatalogCorruption(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitsync_adapters::{
        ListedActivity, PlatformAdapter, PlatformHealth, PlatformInfo, UploadMetadata, UploadOutcome,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tempfile::tempdir;

    struct FakeAdapter {
        bytes: Vec<u8>,
        format: FileFormat,
    }

    #[async_trait]
    impl PlatformAdapter for FakeAdapter {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn list_activities(
            &self,
            _since: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<ListedActivity>, SyncError> {
            Ok(Vec::new())
        }

        async fn download(
            &self,
            _platform_activity_id: &str,
            _preferred_format: FileFormat,
        ) -> Result<(Vec<u8>, FileFormat), SyncError> {
            Ok((self.bytes.clone(), self.format))
        }

        async fn upload(
            &self,
            _bytes: &[u8],
            _format: FileFormat,
            _metadata: &UploadMetadata,
        ) -> Result<UploadOutcome, SyncError> {
            Ok(UploadOutcome::Accepted { remote_id: "x".to_string() })
        }

        fn supported_upload_formats(&self) -> Vec<FileFormat> {
            vec![FileFormat::Fit]
        }

        fn info(&self) -> PlatformInfo {
            PlatformInfo {
                platform_name: "fake",
                api_cost_per_list: 1,
                api_cost_per_download: 1,
                api_cost_per_upload: 1,
            }
        }

        async fn health_check(&self) -> PlatformHealth {
            PlatformHealth::Ok
        }
    }

    #[tokio::test]
    async fn downloads_then_reuses_cache_hit() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::open_in_memory().await.unwrap();
        store.record_mapping("fp1", "fake", "remote-1").await.unwrap();

        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(FakeAdapter {
            bytes: b"raw-fit-bytes".to_vec(),
            format: FileFormat::Fit,
        }));

        let cache = FileCache::new(
            dir.path(),
            store,
            registry,
            Arc::new(crate::transcoder::BestEffortTranscoder),
            ChronoDuration::days(30),
        );

        let path = cache.ensure_file("fp1", FileFormat::Fit).await.unwrap();
        assert!(tokio::fs::try_exists(&path).await.unwrap());

        // second call should hit the cache without needing the adapter again.
        let path_again = cache.ensure_file("fp1", FileFormat::Fit).await.unwrap();
        assert_eq!(path, path_again);
    }

    #[tokio::test]
    async fn missing_mapping_is_no_original_file() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::open_in_memory().await.unwrap();
        let registry = AdapterRegistry::new();
        let cache = FileCache::new(
            dir.path(),
            store,
            registry,
            Arc::new(crate::transcoder::BestEffortTranscoder),
            ChronoDuration::days(30),
        );
        let err = cache.ensure_file("unknown", FileFormat::Fit).await.unwrap_err();
        assert!(matches!(err, SyncError::NoOriginalFile));
    }

    #[tokio::test]
    async fn sweep_drops_dangling_entries() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::open_in_memory().await.unwrap();
        store.record_cache("fp1", "fit", dir.path().join("ghost.fit").to_str().unwrap(), 10).await.unwrap();
        let cache = FileCache::new(
            dir.path(),
            store.clone(),
            AdapterRegistry::new(),
            Arc::new(crate::transcoder::BestEffortTranscoder),
            ChronoDuration::days(30),
        );
        let removed = cache.sweep().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_cache("fp1", "fit").await.unwrap().is_none());
    }
}
