//! API request handlers

use super::models::{
    CleanRequest, DeleteModelResponse, DownloadRequest, DownloadResponse, ExportRequest,
    ExportResponse, HealthResponse, ListModelsQuery, ListModelsResponse, LocalModel,
    ModelInfoResponse, SearchParams, SearchResponse, StatusResponse,
};
use super::routes::AppState;
use crate::download::DownloadOptions;
use crate::error::{DevonError, Result};
use crate::search::parse_query;
use crate::sources::validate_include_patterns;
use crate::storage::{CleanReport, ExportFormat};
use crate::utils::{format_bytes, resolve_model_reference};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

/// Upper bound on `limit` for a single search request
const MAX_SEARCH_LIMIT: usize = 100;

/// GET /health - Service health check
pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now(),
        }),
    )
}

/// GET /metrics - Prometheus metrics
pub async fn metrics(State(state): State<AppState>) -> String {
    state.prometheus_handle.render()
}

/// GET /api/v1/models - List locally downloaded models
pub async fn list_models(
    State(state): State<AppState>,
    Query(query): Query<ListModelsQuery>,
) -> Result<Json<ListModelsResponse>> {
    state.storage.refresh().await?;

    let entries = state.storage.list(query.source.as_deref()).await;
    let total_size_bytes = entries.iter().map(|e| e.size_bytes).sum();

    Ok(Json(ListModelsResponse {
        count: entries.len(),
        total_size_bytes,
        models: entries.into_iter().map(LocalModel::from).collect(),
    }))
}

/// GET /api/v1/models/{source}/{*model_id} - Local entry plus remote metadata
///
/// The remote lookup is best-effort; 404 only when neither side knows the model.
pub async fn get_model(
    State(state): State<AppState>,
    Path((source, model_id)): Path<(String, String)>,
) -> Result<Json<ModelInfoResponse>> {
    state.storage.refresh().await?;
    let local = state.storage.get_entry(&source, &model_id).await;

    let remote = match state.sources.get(&source) {
        Ok(client) => match client.get_model_info(&model_id).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::debug!(source = %source, model_id = %model_id, error = %e, "Remote lookup failed");
                None
            }
        },
        Err(_) if local.is_some() => None,
        Err(e) => return Err(e),
    };

    if local.is_none() && remote.is_none() {
        return Err(DevonError::ModelNotFound {
            source_name: source,
            model_id,
        });
    }

    Ok(Json(ModelInfoResponse {
        local: local.map(LocalModel::from),
        remote,
    }))
}

/// DELETE /api/v1/models/{source}/{*model_id} - Remove a model and its files
pub async fn delete_model(
    State(state): State<AppState>,
    Path((source, model_id)): Path<(String, String)>,
) -> Result<Json<DeleteModelResponse>> {
    if !state.storage.delete(&source, &model_id).await? {
        return Err(DevonError::ModelNotFound {
            source_name: source,
            model_id,
        });
    }

    crate::metrics::record_model_deleted(&source);
    let stats = state.storage.stats().await;
    crate::metrics::update_storage_gauges(stats.model_count, stats.total_size_bytes);

    Ok(Json(DeleteModelResponse {
        deleted: true,
        source,
        model_id,
    }))
}

/// GET /api/v1/search - Search a remote source
///
/// Inline tokens such as `30b` or `gguf` in the query become filters; explicit
/// query-string filters take precedence over them.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let source_name = params
        .source
        .clone()
        .unwrap_or_else(|| state.settings.sources.default.clone());
    let source = state.sources.get(&source_name)?;

    let limit = params
        .limit
        .unwrap_or(state.settings.search.default_limit)
        .clamp(1, MAX_SEARCH_LIMIT);

    let parsed = parse_query(params.query.as_deref().unwrap_or_default());
    let mut filters = parsed.filters;
    for filter in params.filters().iter() {
        filters.push(filter.clone());
    }

    let results = source
        .search(parsed.text.as_deref(), &filters, limit)
        .await?;

    Ok(Json(SearchResponse {
        source: source_name,
        query: params.query,
        count: results.len(),
        results,
    }))
}

/// POST /api/v1/downloads - Download a model and register it
///
/// Runs to completion before responding; clients should use long timeouts.
pub async fn download(
    State(state): State<AppState>,
    Json(req): Json<DownloadRequest>,
) -> Result<Json<DownloadResponse>> {
    let (source_name, model_id) = resolve_model_reference(
        &req.model_id,
        req.source.as_deref(),
        &state.settings.sources.default,
    )?;
    let source = state.sources.get(&source_name)?;

    // Reject unsafe input before contacting the source
    state.storage.resolve_path(&source_name, &model_id)?;
    if let Some(patterns) = &req.include_patterns {
        validate_include_patterns(patterns)?;
    }

    let already_present = state.storage.is_present(&source_name, &model_id).await;
    if req.force || !already_present {
        let quota = state.settings.max_storage_bytes();
        if quota.is_some() || state.settings.download.check_disk_space {
            let remote = source.get_model_info(&model_id).await?;
            state
                .downloads
                .check_capacity(
                    remote.total_size_bytes,
                    quota,
                    state.settings.download.check_disk_space,
                )
                .await?;
        }
    }

    let options = DownloadOptions {
        force: req.force,
        include: req.include_patterns.filter(|p| !p.is_empty()),
        progress: None,
    };
    let files = state
        .downloads
        .download_with(source.as_ref(), &model_id, options)
        .await?;

    let entry = state
        .storage
        .get_entry(&source_name, &model_id)
        .await
        .ok_or_else(|| DevonError::IndexInconsistency {
            key: crate::storage::index_key(&source_name, &model_id),
            detail: "entry missing after download".to_string(),
        })?;

    Ok(Json(DownloadResponse {
        source: source_name,
        model_id,
        path: entry.path,
        files,
        size_bytes: entry.size_bytes,
    }))
}

/// GET /api/v1/status - Storage statistics
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    state.storage.refresh().await?;
    let stats = state.storage.stats().await;
    crate::metrics::update_storage_gauges(stats.model_count, stats.total_size_bytes);

    Ok(Json(StatusResponse {
        storage_path: state.storage.base_path().to_path_buf(),
        index_file: state.storage.index_file().to_path_buf(),
        model_count: stats.model_count,
        total_size_bytes: stats.total_size_bytes,
        total_size: format_bytes(stats.total_size_bytes as f64),
        max_size_bytes: state.settings.max_storage_bytes(),
        sources: stats.sources,
        registered_sources: state.sources.list_all(),
        downloads_in_flight: state.downloads.in_flight(),
    }))
}

/// POST /api/v1/clean - Remove unused or all models
pub async fn clean(
    State(state): State<AppState>,
    Json(req): Json<CleanRequest>,
) -> Result<Json<CleanReport>> {
    let policy = req
        .policy()
        .ok_or_else(|| DevonError::validation("Specify either 'unused' or 'all'"))?;

    let report = state.storage.clean(policy, req.dry_run).await?;

    for removed in &report.removed {
        crate::metrics::record_model_deleted(&removed.source);
    }
    let stats = state.storage.stats().await;
    crate::metrics::update_storage_gauges(stats.model_count, stats.total_size_bytes);

    Ok(Json(report))
}

/// POST /api/v1/export - Export the catalog for other tools
///
/// Exported models count as used.
pub async fn export(
    State(state): State<AppState>,
    Json(req): Json<ExportRequest>,
) -> Result<Json<ExportResponse>> {
    let format: ExportFormat = match req.format.as_deref() {
        Some(f) => f.parse()?,
        None => ExportFormat::default(),
    };

    state.storage.refresh().await?;
    let entries = state.storage.list(req.source.as_deref()).await;
    let content = format.to_value(&entries)?;

    state
        .storage
        .mark_used_many(entries.iter().map(|e| (e.source.as_str(), e.model_id.as_str())))
        .await?;

    Ok(Json(ExportResponse {
        format: format.as_str().to_string(),
        count: entries.len(),
        content,
    }))
}
