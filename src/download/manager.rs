//! Download-and-register orchestration
//!
//! One call fetches a model through a source and records it in storage. Concurrent
//! requests for the same model are serialized per key: the second caller waits for
//! the first and then returns the freshly registered files instead of fetching again.

use crate::error::{DevonError, Result};
use crate::metrics;
use crate::sources::{ModelSource, ProgressCallback, validate_include_patterns};
use crate::storage::index::{self, index_key};
use crate::storage::{IndexEntry, ModelStorage};
use crate::utils::{ensure_free_space, ensure_within_quota};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-call download settings
#[derive(Clone, Default)]
pub struct DownloadOptions {
    /// Fetch even if the model is already registered
    pub force: bool,
    /// Restrict the fetched files to these glob patterns
    pub include: Option<Vec<String>>,
    pub progress: Option<ProgressCallback>,
}

impl DownloadOptions {
    pub fn force(force: bool) -> Self {
        Self {
            force,
            ..Default::default()
        }
    }
}

pub struct DownloadManager {
    storage: Arc<ModelStorage>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

/// Holds a per-key lock slot and removes it from the map once nobody else uses it
struct InFlightSlot<'a> {
    map: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    lock: Option<Arc<Mutex<()>>>,
}

impl InFlightSlot<'_> {
    async fn acquire(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        drop(self.lock.take());
        // Only the map holds the lock once every claimant has let go
        self.map
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 1);
    }
}

impl DownloadManager {
    pub fn new(storage: Arc<ModelStorage>) -> Self {
        Self {
            storage,
            in_flight: DashMap::new(),
        }
    }

    pub fn storage(&self) -> &Arc<ModelStorage> {
        &self.storage
    }

    /// Number of keys with a download running or waiting
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn claim(&self, key: &str) -> InFlightSlot<'_> {
        let lock = self
            .in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        InFlightSlot {
            map: &self.in_flight,
            key: key.to_string(),
            lock: Some(lock),
        }
    }

    /// Refuse a download of `incoming` bytes that would exceed the quota or the disk
    ///
    /// The disk check runs against the nearest existing ancestor of the storage root.
    pub async fn check_capacity(
        &self,
        incoming: u64,
        quota: Option<u64>,
        check_disk: bool,
    ) -> Result<()> {
        ensure_within_quota(self.storage.total_size().await, incoming, quota)?;

        if check_disk
            && let Some(existing) = self.storage.base_path().ancestors().find(|p| p.exists())
        {
            ensure_free_space(existing, incoming)?;
        }
        Ok(())
    }

    /// Download `model_id` from `source` unless it is already registered
    pub async fn download(
        &self,
        source: &dyn ModelSource,
        model_id: &str,
        force: bool,
    ) -> Result<Vec<String>> {
        self.download_with(source, model_id, DownloadOptions::force(force))
            .await
    }

    /// Download with include patterns and progress reporting
    ///
    /// Returns the files fetched by this call, or the registered files when the
    /// model was already present. Source errors propagate unchanged and nothing is
    /// retried.
    pub async fn download_with(
        &self,
        source: &dyn ModelSource,
        model_id: &str,
        options: DownloadOptions,
    ) -> Result<Vec<String>> {
        let source_name = source.name().to_string();

        // Reject unsafe input before any side effect
        let dest = self.storage.resolve_path(&source_name, model_id)?;
        if let Some(patterns) = &options.include {
            validate_include_patterns(patterns)?;
        }

        let key = index_key(&source_name, model_id);
        let requested_at = index::now();

        let slot = self.claim(&key);
        let _guard = slot.acquire().await;

        if let Some(entry) = self.storage.get_entry(&source_name, model_id).await {
            if entry.downloaded_at >= requested_at {
                tracing::info!(key = %key, "Download finished by a concurrent request");
                metrics::record_download_cached(&source_name);
                return Ok(entry.files);
            }
            if !options.force
                && let Some(files) = self.reuse_existing(&key, &entry).await
            {
                metrics::record_download_cached(&source_name);
                return Ok(files);
            }
        }

        tracing::info!(
            source = %source_name,
            model_id = %model_id,
            dest = ?dest,
            force = options.force,
            "Starting download"
        );
        metrics::record_download_started(&source_name);

        let result = self
            .fetch_and_register(source, model_id, &dest, options)
            .await;

        match &result {
            Ok(files) => tracing::info!(
                key = %key,
                files = files.len(),
                "Download complete"
            ),
            Err(e) => {
                metrics::record_download_failed(&source_name);
                tracing::warn!(key = %key, error = %e, "Download failed");
            }
        }

        result
    }

    /// Registered files of a present model, or `None` if its directory is gone
    async fn reuse_existing(&self, key: &str, entry: &IndexEntry) -> Option<Vec<String>> {
        if tokio::fs::try_exists(&entry.path).await.unwrap_or(false) {
            tracing::info!(key = %key, "Model already downloaded");
            return Some(entry.files.clone());
        }

        tracing::warn!(
            key = %key,
            path = ?entry.path,
            "Registered model directory is missing, downloading again"
        );
        None
    }

    async fn fetch_and_register(
        &self,
        source: &dyn ModelSource,
        model_id: &str,
        dest: &std::path::Path,
        options: DownloadOptions,
    ) -> Result<Vec<String>> {
        let source_name = source.name();

        let files = source
            .download_model(model_id, dest, options.progress, options.include.as_deref())
            .await?;

        let metadata = source.get_model_info(model_id).await?;

        let registered = self
            .storage
            .register(source_name, model_id, &metadata, &files)
            .await?;

        let key = registered.key();
        if self.storage.get_entry(source_name, model_id).await.is_none() {
            return Err(DevonError::IndexInconsistency {
                key,
                detail: "entry missing immediately after registration".to_string(),
            });
        }
        if !files.is_empty() && !tokio::fs::try_exists(&registered.path).await.unwrap_or(false) {
            return Err(DevonError::IndexInconsistency {
                key,
                detail: format!(
                    "registered {} files but {:?} does not exist",
                    files.len(),
                    registered.path
                ),
            });
        }

        metrics::record_download_completed(source_name, registered.size_bytes);
        let stats = self.storage.stats().await;
        metrics::update_storage_gauges(stats.model_count, stats.total_size_bytes);

        Ok(files)
    }
}
