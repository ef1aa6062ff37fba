//! API request and response models

use crate::models::ModelMetadata;
use crate::search::SearchFilters;
use crate::storage::{CleanPolicy, IndexEntry, SourceStats};
use crate::utils::format_bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Query of `GET /api/v1/models`
#[derive(Debug, Default, Deserialize)]
pub struct ListModelsQuery {
    pub source: Option<String>,
}

/// A locally downloaded model
#[derive(Debug, Serialize, Deserialize)]
pub struct LocalModel {
    pub source: String,
    pub model_id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub size: String,
    pub file_count: usize,
    pub files: Vec<String>,
    pub downloaded_at: chrono::DateTime<chrono::Utc>,
    pub last_used: Option<chrono::DateTime<chrono::Utc>>,
    pub metadata: Map<String, Value>,
}

impl From<IndexEntry> for LocalModel {
    fn from(entry: IndexEntry) -> Self {
        Self {
            size: format_bytes(entry.size_bytes as f64),
            file_count: entry.files.len(),
            source: entry.source,
            model_id: entry.model_id,
            path: entry.path,
            size_bytes: entry.size_bytes,
            files: entry.files,
            downloaded_at: entry.downloaded_at,
            last_used: entry.last_used,
            metadata: entry.metadata,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListModelsResponse {
    pub count: usize,
    pub total_size_bytes: u64,
    pub models: Vec<LocalModel>,
}

/// Local entry and remote metadata of one model; at least one is present
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfoResponse {
    pub local: Option<LocalModel>,
    pub remote: Option<ModelMetadata>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteModelResponse {
    pub deleted: bool,
    pub source: String,
    pub model_id: String,
}

/// Query of `GET /api/v1/search`
///
/// Every filter is optional; values use the same syntax as the CLI flags.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(alias = "q")]
    pub query: Option<String>,
    pub source: Option<String>,
    pub limit: Option<usize>,
    pub author: Option<String>,
    pub format: Option<String>,
    pub params: Option<String>,
    pub size: Option<String>,
    pub task: Option<String>,
    pub license: Option<String>,
    pub architecture: Option<String>,
    pub min_downloads: Option<String>,
    pub quantization: Option<String>,
}

impl SearchParams {
    /// Explicit filters from the query string; invalid values are ignored
    pub fn filters(&self) -> SearchFilters {
        let pairs = [
            ("author", &self.author),
            ("format", &self.format),
            ("params", &self.params),
            ("size", &self.size),
            ("task", &self.task),
            ("license", &self.license),
            ("architecture", &self.architecture),
            ("min_downloads", &self.min_downloads),
            ("quantization", &self.quantization),
        ];

        SearchFilters::from_pairs(
            pairs
                .into_iter()
                .filter_map(|(key, value)| value.as_deref().map(|v| (key, v))),
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub source: String,
    pub query: Option<String>,
    pub count: usize,
    pub results: Vec<ModelMetadata>,
}

/// Body of `POST /api/v1/downloads`
#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Model id, or a model page URL such as `https://huggingface.co/org/name`
    pub model_id: String,

    /// Defaults to the configured default source
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub force: bool,

    #[serde(default)]
    pub include_patterns: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub source: String,
    pub model_id: String,
    pub path: PathBuf,
    pub files: Vec<String>,
    pub size_bytes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub storage_path: PathBuf,
    pub index_file: PathBuf,
    pub model_count: usize,
    pub total_size_bytes: u64,
    pub total_size: String,
    pub max_size_bytes: Option<u64>,
    pub sources: BTreeMap<String, SourceStats>,
    pub registered_sources: Vec<String>,
    pub downloads_in_flight: usize,
}

/// Body of `POST /api/v1/clean`
#[derive(Debug, Serialize, Deserialize)]
pub struct CleanRequest {
    /// Remove models unused for `days`
    #[serde(default)]
    pub unused: bool,

    #[serde(default = "default_clean_days")]
    pub days: u32,

    /// Remove every model
    #[serde(default)]
    pub all: bool,

    #[serde(default)]
    pub dry_run: bool,
}

fn default_clean_days() -> u32 {
    30
}

impl CleanRequest {
    /// `all` wins over `unused`; `None` when neither is set
    pub fn policy(&self) -> Option<CleanPolicy> {
        if self.all {
            Some(CleanPolicy::All)
        } else if self.unused {
            Some(CleanPolicy::UnusedFor(self.days))
        } else {
            None
        }
    }
}

/// Body of `POST /api/v1/export`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub format: Option<String>,

    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportResponse {
    pub format: String,
    pub count: usize,
    /// Paths for `kitt`, model objects for `json`
    pub content: Value,
}
