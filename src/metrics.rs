//! Prometheus metrics

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder
/// Returns a handle used by `/metrics` to render the current values
pub fn setup_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!("Prometheus metrics exporter installed");

    Ok(handle)
}

/// Record a download that reached the remote fetch
pub fn record_download_started(source: &str) {
    metrics::counter!("devon_downloads_started_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// Record a download that was fetched and registered
pub fn record_download_completed(source: &str, size_bytes: u64) {
    metrics::counter!("devon_downloads_completed_total",
        "source" => source.to_string()
    )
    .increment(1);
    metrics::counter!("devon_downloaded_bytes_total",
        "source" => source.to_string()
    )
    .increment(size_bytes);
}

/// Record a download that failed before registration
pub fn record_download_failed(source: &str) {
    metrics::counter!("devon_downloads_failed_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// Record a request answered from the index without fetching
pub fn record_download_cached(source: &str) {
    metrics::counter!("devon_downloads_cached_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// Record model deletion
pub fn record_model_deleted(source: &str) {
    metrics::counter!("devon_models_deleted_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// Update catalog gauges
pub fn update_storage_gauges(model_count: usize, total_bytes: u64) {
    metrics::gauge!("devon_models_count").set(model_count as f64);
    metrics::gauge!("devon_models_size_bytes").set(total_bytes as f64);
}
