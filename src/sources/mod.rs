//! Remote model sources
//!
//! A source is a client for one remote model repository. Sources are looked up by
//! name through a [`SourceRegistry`] built once at startup and shared by the CLI and
//! the API server.

pub mod huggingface;
pub mod patterns;
pub mod registry;

pub use huggingface::HuggingFaceSource;
pub use patterns::{IncludeFilter, validate_include_patterns};
pub use registry::{SourceFactory, SourceRegistry};

use crate::error::Result;
use crate::models::ModelMetadata;
use crate::search::SearchFilters;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Progress of an in-flight download, reported per received chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadProgress {
    /// File currently being fetched, relative to the model directory
    pub file: String,
    /// Bytes of this download on disk so far, including files skipped or resumed
    pub downloaded_bytes: u64,
    /// Expected total across all files, when the source knows it
    pub total_bytes: Option<u64>,
    pub files_completed: usize,
    pub files_total: usize,
}

/// Called from the download task; must be cheap and must not block
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

#[async_trait]
pub trait ModelSource: Send + Sync {
    /// Registry key, also the first component of the on-disk layout
    fn name(&self) -> &str;

    /// Probe the remote; never fails, unreachable means unavailable
    async fn is_available(&self) -> bool;

    /// Search the remote, returning at most `limit` models that pass `filters`
    async fn search(
        &self,
        query: Option<&str>,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<ModelMetadata>>;

    /// Fails with `ModelNotFound` when the repository is missing or inaccessible
    async fn get_model_info(&self, model_id: &str) -> Result<ModelMetadata>;

    /// Fetch the model's files into `dest`, resuming partial files
    ///
    /// `include` restricts the fetched files to those matching one of the glob patterns.
    /// Patterns are validated before any network access. Returns the fetched paths
    /// relative to `dest`.
    async fn download_model(
        &self,
        model_id: &str,
        dest: &Path,
        progress: Option<ProgressCallback>,
        include: Option<&[String]>,
    ) -> Result<Vec<String>>;
}
