//! HuggingFace Hub source
//!
//! Search and model info come from the Hub JSON API. Downloads enumerate the
//! repository through `hf-hub` and stream each file into the destination directory,
//! resuming from a `.part` file when one is left over from an interrupted run.

use super::patterns::{IncludeFilter, is_safe_relative_path};
use super::{DownloadProgress, ModelSource, ProgressCallback};
use crate::error::{DevonError, Result};
use crate::models::ModelMetadata;
use crate::search::SearchFilters;
use crate::utils::detect_formats_from_files;
use async_trait::async_trait;
use futures::StreamExt;
use hf_hub::api::tokio::{Api, ApiBuilder};
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const SOURCE_NAME: &str = "huggingface";
const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

const ARCHITECTURES: [&str; 6] = ["llama", "qwen", "mistral", "gpt", "bert", "gemma"];
const QUANTIZATIONS: [&str; 7] = ["Q4_K_M", "Q5_K_M", "Q8_0", "fp16", "bf16", "int8", "int4"];

static PARAM_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)b").expect("valid regex"));

/// Model as returned by `/api/models` and `/api/models/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HubModel {
    id: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    downloads: u64,
    #[serde(default)]
    likes: u64,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default)]
    siblings: Vec<HubSibling>,
    #[serde(default)]
    card_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HubSibling {
    rfilename: String,
    #[serde(default)]
    size: Option<u64>,
}

pub struct HuggingFaceSource {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HuggingFaceSource {
    /// Source against the public Hub, honoring `HF_ENDPOINT` and `HF_TOKEN`
    pub fn new() -> Self {
        let endpoint = std::env::var("HF_ENDPOINT")
            .ok()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let token = std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty());
        Self::with_endpoint(endpoint, token)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("devon/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn hub_api(&self, model_id: &str) -> Result<Api> {
        ApiBuilder::new()
            .with_endpoint(self.endpoint.clone())
            .with_token(self.token.clone())
            .with_progress(false)
            .build()
            .map_err(|e| DevonError::remote(SOURCE_NAME, model_id, "download", e))
    }

    /// `/api/models/{id}` with blob sizes
    async fn fetch_model(&self, model_id: &str, operation: &'static str) -> Result<HubModel> {
        let remote = |e: reqwest::Error| DevonError::remote(SOURCE_NAME, model_id, operation, e);
        let url = format!("{}/api/models/{}", self.endpoint, model_id);

        let response = self
            .get(&url)
            .query(&[("blobs", "true")])
            .send()
            .await
            .map_err(remote)?;

        // Private and gated repositories answer 401 instead of 404
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED
        ) {
            return Err(DevonError::ModelNotFound {
                source_name: SOURCE_NAME.to_string(),
                model_id: model_id.to_string(),
            });
        }

        response
            .error_for_status()
            .map_err(remote)?
            .json()
            .await
            .map_err(remote)
    }

    /// Sizes of the repository's files; empty when the Hub does not report them
    async fn file_sizes(&self, model_id: &str) -> HashMap<String, u64> {
        match self.fetch_model(model_id, "download").await {
            Ok(model) => model
                .siblings
                .into_iter()
                .filter_map(|s| s.size.map(|size| (s.rfilename, size)))
                .collect(),
            Err(e) => {
                tracing::debug!(model_id = %model_id, error = %e, "File sizes unavailable");
                HashMap::new()
            }
        }
    }

    /// List the repository's files through hf-hub, keeping their resolve URLs
    async fn list_files(&self, model_id: &str) -> Result<Vec<(String, String)>> {
        let api = self.hub_api(model_id)?;
        let repo = api.model(model_id.to_string());
        let info = repo
            .info()
            .await
            .map_err(|e| DevonError::remote(SOURCE_NAME, model_id, "download", e))?;

        Ok(info
            .siblings
            .into_iter()
            .map(|s| {
                let url = repo.url(&s.rfilename);
                (s.rfilename, url)
            })
            .collect())
    }

    /// Stream one file to `target`, resuming from `target.part`
    ///
    /// Returns the number of bytes received in this call.
    async fn fetch_file(
        &self,
        model_id: &str,
        url: &str,
        target: &Path,
        mut on_chunk: impl FnMut(u64),
    ) -> Result<u64> {
        let remote = |e: reqwest::Error| DevonError::remote(SOURCE_NAME, model_id, "download", e);
        let part = part_path(target);

        let mut resume_from = match fs::metadata(&part).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut request = self.get(url);
        if resume_from > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={resume_from}-"));
        }
        let response = request.send().await.map_err(remote)?;
        let status = response.status();

        if status == StatusCode::RANGE_NOT_SATISFIABLE && resume_from > 0 {
            // Partial file already holds the whole body
            on_chunk(resume_from);
            fs::rename(&part, target)
                .await
                .map_err(|e| DevonError::io(format!("Failed to finalize {:?}", target), e))?;
            return Ok(0);
        }
        let response = response.error_for_status().map_err(remote)?;

        let mut file = if resume_from > 0 && response.status() == StatusCode::PARTIAL_CONTENT {
            tracing::debug!(model_id = %model_id, file = ?target, offset = resume_from, "Resuming download");
            on_chunk(resume_from);
            fs::OpenOptions::new()
                .append(true)
                .open(&part)
                .await
                .map_err(|e| DevonError::io(format!("Failed to open {:?}", part), e))?
        } else {
            resume_from = 0;
            fs::File::create(&part)
                .await
                .map_err(|e| DevonError::io(format!("Failed to create {:?}", part), e))?
        };

        let mut received = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(remote)?;
            file.write_all(&bytes)
                .await
                .map_err(|e| DevonError::io(format!("Failed to write {:?}", part), e))?;
            received += bytes.len() as u64;
            on_chunk(bytes.len() as u64);
        }

        file.sync_all()
            .await
            .map_err(|e| DevonError::io(format!("Failed to sync {:?}", part), e))?;
        drop(file);

        fs::rename(&part, target)
            .await
            .map_err(|e| DevonError::io(format!("Failed to finalize {:?}", target), e))?;

        tracing::debug!(
            model_id = %model_id,
            file = ?target,
            bytes = resume_from + received,
            "File downloaded"
        );

        Ok(received)
    }
}

impl Default for HuggingFaceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelSource for HuggingFaceSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/models", self.endpoint);
        let probe = self
            .get(&url)
            .query(&[("limit", "1")])
            .timeout(Duration::from_secs(10))
            .send()
            .await;

        match probe {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "HuggingFace availability probe failed");
                false
            }
        }
    }

    async fn search(
        &self,
        query: Option<&str>,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<ModelMetadata>> {
        let subject = query.unwrap_or_default();
        let remote = |e: reqwest::Error| DevonError::remote(SOURCE_NAME, subject, "search", e);

        // Over-fetch so local post-filtering can still fill the page
        let mut params: Vec<(&str, String)> = vec![
            ("limit", (limit.max(1) * 2).to_string()),
            ("sort", "downloads".to_string()),
            ("direction", "-1".to_string()),
            ("full", "true".to_string()),
            ("cardData", "true".to_string()),
        ];
        if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
            params.push(("search", q.to_string()));
        }
        if let Some(author) = filters.author() {
            params.push(("author", author.to_string()));
        }
        if let Some(task) = filters.task() {
            params.push(("pipeline_tag", task.to_string()));
        }

        let url = format!("{}/api/models", self.endpoint);
        let models: Vec<HubModel> = self
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(remote)?
            .error_for_status()
            .map_err(remote)?
            .json()
            .await
            .map_err(remote)?;

        let fetched = models.len();
        let results: Vec<ModelMetadata> = models
            .into_iter()
            .map(to_metadata)
            .filter(|m| filters.matches(m))
            .take(limit)
            .collect();

        tracing::debug!(
            query = %subject,
            fetched = fetched,
            returned = results.len(),
            "HuggingFace search complete"
        );

        Ok(results)
    }

    async fn get_model_info(&self, model_id: &str) -> Result<ModelMetadata> {
        self.fetch_model(model_id, "info").await.map(to_metadata)
    }

    async fn download_model(
        &self,
        model_id: &str,
        dest: &Path,
        progress: Option<ProgressCallback>,
        include: Option<&[String]>,
    ) -> Result<Vec<String>> {
        let filter = IncludeFilter::new(include)?;

        let files: Vec<(String, String)> = self
            .list_files(model_id)
            .await?
            .into_iter()
            .filter(|(name, _)| filter.matches(name))
            .collect();

        if let Some((unsafe_name, _)) = files.iter().find(|(name, _)| !is_safe_relative_path(name))
        {
            return Err(DevonError::validation(format!(
                "Remote file name '{unsafe_name}' escapes the model directory"
            )));
        }

        fs::create_dir_all(dest)
            .await
            .map_err(|e| DevonError::io(format!("Failed to create {:?}", dest), e))?;

        let total_bytes = if progress.is_some() {
            expected_total(&files, &self.file_sizes(model_id).await)
        } else {
            None
        };

        tracing::info!(
            model_id = %model_id,
            dest = ?dest,
            files = files.len(),
            total_bytes = ?total_bytes,
            "Downloading model files"
        );

        let files_total = files.len();
        let mut downloaded_bytes = 0u64;
        let mut fetched = Vec::with_capacity(files_total);

        for (index, (name, url)) in files.into_iter().enumerate() {
            let target = dest.join(&name);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DevonError::io(format!("Failed to create {:?}", parent), e))?;
            }

            if let Ok(meta) = fs::metadata(&target).await {
                tracing::debug!(model_id = %model_id, file = %name, "Already present, skipping");
                downloaded_bytes += meta.len();
            } else {
                let report = |chunk: u64| {
                    downloaded_bytes += chunk;
                    if let Some(callback) = &progress {
                        callback(DownloadProgress {
                            file: name.clone(),
                            downloaded_bytes,
                            total_bytes,
                            files_completed: index,
                            files_total,
                        });
                    }
                };
                self.fetch_file(model_id, &url, &target, report).await?;
            }

            if let Some(callback) = &progress {
                callback(DownloadProgress {
                    file: name.clone(),
                    downloaded_bytes,
                    total_bytes,
                    files_completed: index + 1,
                    files_total,
                });
            }
            fetched.push(name);
        }

        Ok(fetched)
    }
}

/// Sum of the selected files' sizes, if every one of them is known
fn expected_total(files: &[(String, String)], sizes: &HashMap<String, u64>) -> Option<u64> {
    files
        .iter()
        .map(|(name, _)| sizes.get(name).copied())
        .sum::<Option<u64>>()
        .filter(|total| *total > 0)
}

fn part_path(target: &Path) -> std::path::PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    name.into()
}

fn to_metadata(model: HubModel) -> ModelMetadata {
    let model_name = model
        .id
        .rsplit('/')
        .next()
        .unwrap_or(&model.id)
        .to_string();
    let author = model
        .author
        .clone()
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| model.id.split('/').next().unwrap_or_default().to_string());

    let license = model
        .card_data
        .as_ref()
        .and_then(|card| card.get("license"))
        .and_then(|license| match license {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => items.first().and_then(|v| v.as_str()).map(String::from),
            _ => None,
        });

    ModelMetadata {
        source: SOURCE_NAME.to_string(),
        model_name,
        author,
        total_size_bytes: model.siblings.iter().filter_map(|s| s.size).sum(),
        file_count: model.siblings.len() as u64,
        parameter_count: extract_param_count(&model.tags, &model.id),
        architecture: extract_architecture(&model.tags),
        format: detect_formats_from_files(model.siblings.iter().map(|s| s.rfilename.as_str())),
        quantization: detect_quantization(&model.tags, &model.id),
        license,
        downloads: model.downloads,
        likes: model.likes,
        created_at: model.created_at.unwrap_or_default(),
        updated_at: model.last_modified.unwrap_or_default(),
        web_url: format!("{DEFAULT_ENDPOINT}/{}", model.id),
        repo_url: format!("{DEFAULT_ENDPOINT}/{}/tree/main", model.id),
        tags: model.tags,
        model_id: model.id,
        ..Default::default()
    }
}

/// Billions of parameters from the first tag mentioning `<n>b`, else from the id
fn extract_param_count(tags: &[String], model_id: &str) -> Option<u64> {
    tags.iter()
        .map(String::as_str)
        .chain(std::iter::once(model_id))
        .find_map(|text| {
            PARAM_COUNT_RE
                .captures(&text.to_lowercase())
                .and_then(|c| c[1].parse().ok())
        })
        .filter(|count| *count > 0)
}

fn extract_architecture(tags: &[String]) -> Option<String> {
    tags.iter().find_map(|tag| {
        let tag = tag.to_lowercase();
        ARCHITECTURES
            .iter()
            .find(|arch| tag.contains(*arch))
            .map(|arch| arch.to_string())
    })
}

fn detect_quantization(tags: &[String], model_id: &str) -> Option<String> {
    let text = format!("{} {}", tags.join(" "), model_id);
    QUANTIZATIONS
        .iter()
        .find(|q| text.contains(*q))
        .map(|q| q.to_string())
}
