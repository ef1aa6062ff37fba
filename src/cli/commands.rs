//! Subcommand implementations

use super::display;
use super::{CleanArgs, Context, DownloadArgs, SearchArgs};
use crate::api;
use crate::config::{ApiKeyPolicy, hsts_enabled};
use crate::download::DownloadOptions;
use crate::metrics;
use crate::search::{SearchFilters, parse_query};
use crate::sources::validate_include_patterns;
use crate::storage::{CleanPolicy, ExportFormat};
use crate::utils::{format_bytes, resolve_model_reference};
use anyhow::{Context as _, Result};
use std::path::PathBuf;
use tokio::signal;

pub async fn search(ctx: &Context, args: SearchArgs) -> Result<()> {
    let source_name = ctx.source_name(args.source.as_deref());
    let source = ctx.source(Some(source_name.as_str()))?;

    let parsed = parse_query(args.query.as_deref().unwrap_or_default());
    let mut filters = parsed.filters;
    for filter in SearchFilters::from_pairs(args.filter_pairs()).iter() {
        filters.push(filter.clone());
    }
    let limit = args.limit.unwrap_or(ctx.settings.search.default_limit).max(1);

    eprintln!("Searching {source_name}...");
    let results = source
        .search(parsed.text.as_deref(), &filters, limit)
        .await?;

    if results.is_empty() {
        println!("No models found.");
        return Ok(());
    }

    println!("Found {} models:\n", results.len());
    println!("{}", display::search_table(&results));
    Ok(())
}

pub async fn download(ctx: &Context, args: DownloadArgs) -> Result<()> {
    let (source_name, model_id) = resolve_model_reference(
        &args.model,
        args.source.as_deref(),
        &ctx.settings.sources.default,
    )?;
    let include = (!args.include.is_empty()).then_some(args.include);
    if let Some(patterns) = &include {
        validate_include_patterns(patterns)?;
    }

    if !args.force
        && let Some(entry) = ctx.storage.get_entry(&source_name, &model_id).await
        && entry.path.exists()
    {
        println!("Already downloaded: {model_id}");
        println!("Path: {}", entry.path.display());
        println!("\nUse --force to re-download");
        return Ok(());
    }

    let source = ctx.source(Some(source_name.as_str()))?;

    eprintln!("Fetching model info...");
    let info = source.get_model_info(&model_id).await?;
    println!("{}", display::info_table(&info));

    ctx.downloads
        .check_capacity(
            info.total_size_bytes,
            ctx.settings.max_storage_bytes(),
            ctx.settings.download.check_disk_space,
        )
        .await?;

    if !args.yes {
        let prompt = format!("Download {}?", format_bytes(info.total_size_bytes as f64));
        if !display::confirm(&prompt, true)? {
            return Ok(());
        }
    }

    let bar = display::download_bar(info.total_size_bytes);
    let options = DownloadOptions {
        force: args.force,
        include,
        progress: Some(display::progress_callback(bar.clone())),
    };

    let result = ctx
        .downloads
        .download_with(source.as_ref(), &model_id, options)
        .await;
    bar.finish_and_clear();
    let files = result?;

    let path = ctx.storage.resolve_path(&source_name, &model_id)?;
    println!("Download complete: {} files", files.len());
    println!("Path: {}", path.display());
    Ok(())
}

pub async fn list(ctx: &Context, source: Option<&str>) -> Result<()> {
    let entries = ctx.storage.list(source).await;
    if entries.is_empty() {
        println!("No models downloaded yet.");
        println!("\nUse 'devon search' to find models");
        return Ok(());
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!("{}", display::local_table(&entries));
    println!(
        "\nTotal: {} models, {}",
        entries.len(),
        format_bytes(total as f64)
    );
    Ok(())
}

/// Local details if present, then remote metadata
///
/// Fails only when neither the index nor the remote knows the model.
pub async fn info(ctx: &Context, model_id: &str, source: Option<&str>) -> Result<()> {
    let source_name = ctx.source_name(source);
    let local = ctx.storage.get_entry(&source_name, model_id).await;

    if let Some(entry) = &local {
        println!("Local model:");
        println!("  Path: {}", entry.path.display());
        println!("  Size: {}", format_bytes(entry.size_bytes as f64));
        println!("  Downloaded: {}", entry.downloaded_at.to_rfc3339());
        if let Some(used) = entry.last_used {
            println!("  Last used: {}", used.to_rfc3339());
        }
        println!();
    }

    eprintln!("Fetching info from {source_name}...");
    let remote = match ctx.source(Some(source_name.as_str())) {
        Ok(client) => client.get_model_info(model_id).await.map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };

    match remote {
        Ok(metadata) => println!("{}", display::info_table(&metadata)),
        Err(e) if local.is_some() => {
            tracing::warn!(model_id = %model_id, error = %e, "Remote lookup failed");
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

pub async fn clean(ctx: &Context, args: CleanArgs) -> Result<()> {
    let policy = if args.all {
        CleanPolicy::All
    } else if args.unused {
        CleanPolicy::UnusedFor(args.days)
    } else {
        anyhow::bail!("Specify --unused or --all");
    };

    let preview = ctx.storage.clean(policy, true).await?;
    if preview.candidates.is_empty() {
        println!("Nothing to clean.");
        return Ok(());
    }

    println!("Models to remove ({}):", preview.candidates.len());
    for line in display::cleaned_lines(&preview.candidates) {
        println!("{line}");
    }
    println!(
        "\nTotal: {}",
        format_bytes(preview.candidate_bytes() as f64)
    );

    if args.dry_run {
        println!("\n(dry run - nothing removed)");
        return Ok(());
    }
    if !args.yes && !display::confirm("Proceed with removal?", false)? {
        return Ok(());
    }

    let report = ctx.storage.clean(policy, false).await?;
    for removed in &report.removed {
        metrics::record_model_deleted(&removed.source);
    }
    for failure in &report.failures {
        eprintln!("  Failed: {} ({})", failure.model_id, failure.error);
    }
    println!(
        "\nRemoved {} models, freed {}",
        report.removed.len(),
        format_bytes(report.freed_bytes as f64)
    );

    if !report.failures.is_empty() {
        anyhow::bail!("{} models could not be removed", report.failures.len());
    }
    Ok(())
}

pub async fn export(
    ctx: &Context,
    format: &str,
    output: Option<PathBuf>,
    source: Option<&str>,
) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let entries = ctx.storage.list(source).await;
    if entries.is_empty() {
        println!("No models to export.");
        return Ok(());
    }

    let content = format.render(&entries)?;
    ctx.storage
        .mark_used_many(entries.iter().map(|e| (e.source.as_str(), e.model_id.as_str())))
        .await?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, content)
                .await
                .with_context(|| format!("Failed to write export file: {:?}", path))?;
            println!("Exported {} models to {}", entries.len(), path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}

pub async fn status(ctx: &Context) -> Result<()> {
    let stats = ctx.storage.stats().await;

    println!("DEVON Status\n");
    println!("Models downloaded: {}", stats.model_count);
    println!("Total size: {}", format_bytes(stats.total_size_bytes as f64));
    if let Some(limit) = ctx.settings.max_storage_bytes() {
        println!("Quota: {}", format_bytes(limit as f64));
    }
    println!("Storage path: {}", ctx.storage.base_path().display());

    if !stats.sources.is_empty() {
        println!("\nBy source:");
        for line in display::stats_lines(&stats) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn remove(ctx: &Context, model_id: &str, source: Option<&str>, yes: bool) -> Result<()> {
    let source_name = ctx.source_name(source);
    let Some(entry) = ctx.storage.get_entry(&source_name, model_id).await else {
        anyhow::bail!(
            "Model not found: {}. Use 'devon list' to see downloaded models",
            crate::storage::index_key(&source_name, model_id)
        );
    };

    let size = format_bytes(entry.size_bytes as f64);
    println!("{model_id}");
    println!("Source: {source_name}");
    println!("Size: {size}");
    println!("Path: {}", entry.path.display());

    if !yes && !display::confirm(&format!("Delete {size} from disk?"), false)? {
        return Ok(());
    }

    if !ctx.storage.delete(&source_name, model_id).await? {
        anyhow::bail!("Failed to remove {model_id}: no longer in the index");
    }
    metrics::record_model_deleted(&source_name);
    println!("Removed {model_id} ({size} freed)");
    Ok(())
}

/// Run the REST API until Ctrl+C or SIGTERM
pub async fn serve(ctx: Context, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| ctx.settings.api.host.clone());
    let port = port.unwrap_or(ctx.settings.api.port);

    let api_key = ApiKeyPolicy::from_env();
    if api_key == ApiKeyPolicy::Unconfigured {
        tracing::warn!(
            "DEVON_API_KEY is not set; protected endpoints will answer 503 until it is configured"
        );
    }

    let prometheus_handle = metrics::setup_metrics()?;
    let stats = ctx.storage.stats().await;
    metrics::update_storage_gauges(stats.model_count, stats.total_size_bytes);

    let app_state = api::AppState {
        storage: ctx.storage.clone(),
        downloads: ctx.downloads.clone(),
        sources: ctx.sources.clone(),
        settings: ctx.settings.clone(),
        api_key,
        hsts: hsts_enabled(),
        prometheus_handle,
    };
    let app = api::create_router(app_state);

    let addr = format!("{host}:{port}");
    tracing::info!(addr = %addr, storage = ?ctx.storage.base_path(), "Starting API server");
    eprintln!("Starting DEVON API on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API server to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
