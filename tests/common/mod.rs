//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use devon::error::{DevonError, Result};
use devon::models::ModelMetadata;
use devon::search::SearchFilters;
use devon::sources::{DownloadProgress, IncludeFilter, ModelSource, ProgressCallback};
use devon::storage::ModelStorage;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

pub const MOCK_SOURCE: &str = "mock";
pub const MOCK_MODEL: &str = "acme/tiny-7b";

/// In-memory source serving a fixed set of models
///
/// Every model has the same files. Counters record how often each operation ran.
pub struct MockSource {
    pub name: String,
    pub models: Vec<ModelMetadata>,
    pub files: Vec<(String, Vec<u8>)>,
    pub download_delay: Option<Duration>,
    pub fail_downloads: AtomicBool,
    pub download_calls: AtomicUsize,
    pub info_calls: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::named(MOCK_SOURCE)
    }

    pub fn named(name: &str) -> Self {
        let model = ModelMetadata {
            parameter_count: Some(7),
            format: vec!["gguf".to_string()],
            total_size_bytes: 1024,
            file_count: 2,
            downloads: 1200,
            tags: vec!["text-generation".to_string()],
            ..ModelMetadata::new(name, MOCK_MODEL)
        };
        let other = ModelMetadata {
            parameter_count: Some(70),
            format: vec!["safetensors".to_string()],
            total_size_bytes: 140 * 1024 * 1024 * 1024,
            downloads: 50,
            ..ModelMetadata::new(name, "other/big-70b")
        };

        Self {
            name: name.to_string(),
            models: vec![model, other],
            files: vec![
                ("config.json".to_string(), br#"{"arch":"llama"}"#.to_vec()),
                ("weights/model.gguf".to_string(), vec![7u8; 512]),
            ],
            download_delay: None,
            fail_downloads: AtomicBool::new(false),
            download_calls: AtomicUsize::new(0),
            info_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.download_delay = Some(delay);
        self
    }

    pub fn failing(self) -> Self {
        self.fail_downloads.store(true, Ordering::SeqCst);
        self
    }

    pub fn downloads(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    fn model(&self, model_id: &str) -> Result<&ModelMetadata> {
        self.models
            .iter()
            .find(|m| m.model_id == model_id)
            .ok_or_else(|| DevonError::ModelNotFound {
                source_name: self.name.clone(),
                model_id: model_id.to_string(),
            })
    }
}

#[async_trait]
impl ModelSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn search(
        &self,
        query: Option<&str>,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<ModelMetadata>> {
        let query = query.map(str::to_lowercase);
        Ok(self
            .models
            .iter()
            .filter(|m| {
                query
                    .as_deref()
                    .is_none_or(|q| m.model_id.to_lowercase().contains(q))
            })
            .filter(|m| filters.matches(m))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_model_info(&self, model_id: &str) -> Result<ModelMetadata> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.model(model_id).cloned()
    }

    async fn download_model(
        &self,
        model_id: &str,
        dest: &Path,
        progress: Option<ProgressCallback>,
        include: Option<&[String]>,
    ) -> Result<Vec<String>> {
        let filter = IncludeFilter::new(include)?;
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.model(model_id)?;

        if let Some(delay) = self.download_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(DevonError::remote(
                &self.name,
                model_id,
                "download",
                "connection reset by peer",
            ));
        }

        let selected: Vec<&(String, Vec<u8>)> =
            self.files.iter().filter(|(name, _)| filter.matches(name)).collect();

        let mut fetched = Vec::new();
        let mut downloaded_bytes = 0u64;
        for (index, (name, content)) in selected.iter().enumerate() {
            let target = dest.join(name);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.unwrap();
            }
            tokio::fs::write(&target, content).await.unwrap();
            downloaded_bytes += content.len() as u64;

            if let Some(callback) = &progress {
                callback(DownloadProgress {
                    file: name.clone(),
                    downloaded_bytes,
                    total_bytes: None,
                    files_completed: index + 1,
                    files_total: selected.len(),
                });
            }
            fetched.push(name.clone());
        }
        Ok(fetched)
    }
}

/// Storage rooted at `<tmp>/models`, index at `<tmp>/index.json`
pub async fn open_storage() -> (TempDir, Arc<ModelStorage>) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let storage = ModelStorage::open(temp_dir.path().join("models"))
        .await
        .expect("Failed to open storage");
    (temp_dir, Arc::new(storage))
}
