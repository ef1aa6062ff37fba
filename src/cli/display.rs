//! Terminal rendering: tables, progress bars and prompts

use crate::models::ModelMetadata;
use crate::sources::{DownloadProgress, ProgressCallback};
use crate::storage::{CleanedModel, IndexEntry, StorageStats};
use crate::utils::{format_bytes, format_number};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, presets};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufRead, Write};
use std::sync::Arc;

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|n| Cell::new(n).fg(Color::Magenta).add_attribute(Attribute::Bold))
        .collect()
}

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn params_label(model: &ModelMetadata) -> String {
    model
        .parameter_count
        .map(|p| format!("{p}B"))
        .unwrap_or_else(|| "?".to_string())
}

/// Search results
pub fn search_table(results: &[ModelMetadata]) -> Table {
    let mut table = base_table();
    table.set_header(header(&["#", "Model", "Params", "Size", "Format", "Downloads"]));

    for (idx, model) in results.iter().enumerate() {
        let formats = if model.format.is_empty() {
            "?".to_string()
        } else {
            model.format.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
        };

        table.add_row(vec![
            Cell::new(idx + 1).fg(Color::DarkGrey),
            Cell::new(&model.model_id).fg(Color::Cyan),
            Cell::new(params_label(model)).set_alignment(CellAlignment::Right),
            Cell::new(format_bytes(model.total_size_bytes as f64))
                .set_alignment(CellAlignment::Right),
            Cell::new(formats),
            Cell::new(format_number(model.downloads)).set_alignment(CellAlignment::Right),
        ]);
    }

    table
}

/// Locally downloaded models
pub fn local_table(entries: &[IndexEntry]) -> Table {
    let mut table = base_table();
    table.set_header(header(&["Model", "Source", "Size", "Downloaded", "Last used"]));

    for entry in entries {
        let last_used = entry
            .last_used
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());

        table.add_row(vec![
            Cell::new(&entry.model_id).fg(Color::Cyan),
            Cell::new(&entry.source),
            Cell::new(format_bytes(entry.size_bytes as f64)).set_alignment(CellAlignment::Right),
            Cell::new(entry.downloaded_at.format("%Y-%m-%d %H:%M")),
            Cell::new(last_used).fg(Color::DarkGrey),
        ]);
    }

    table
}

/// Two-column detail view of remote metadata
pub fn info_table(model: &ModelMetadata) -> Table {
    let mut rows: Vec<(&str, String)> = vec![
        ("Model", model.model_id.clone()),
        ("Author", model.author.clone()),
    ];
    if model.parameter_count.is_some() {
        rows.push(("Parameters", params_label(model)));
    }
    if let Some(arch) = &model.architecture {
        rows.push(("Architecture", arch.clone()));
    }
    rows.push(("Size", format_bytes(model.total_size_bytes as f64)));
    rows.push(("Files", model.file_count.to_string()));
    if !model.format.is_empty() {
        rows.push(("Format", model.format.join(", ")));
    }
    if let Some(quant) = &model.quantization {
        rows.push(("Quantization", quant.clone()));
    }
    if let Some(license) = &model.license {
        rows.push(("License", license.clone()));
    }
    rows.push(("Downloads", format_number(model.downloads)));
    rows.push(("Likes", format_number(model.likes)));
    if !model.created_at.is_empty() {
        rows.push(("Created", model.created_at.chars().take(10).collect()));
    }
    if !model.updated_at.is_empty() {
        rows.push(("Updated", model.updated_at.chars().take(10).collect()));
    }
    rows.push(("URL", model.web_url.clone()));

    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);
    for (field, value) in rows {
        table.add_row(vec![Cell::new(field).add_attribute(Attribute::Bold), Cell::new(value)]);
    }
    table
}

/// Per-source breakdown for `status`
pub fn stats_lines(stats: &StorageStats) -> Vec<String> {
    stats
        .sources
        .iter()
        .map(|(source, s)| {
            format!(
                "  {}: {} models ({})",
                source,
                s.count,
                format_bytes(s.size_bytes as f64)
            )
        })
        .collect()
}

pub fn cleaned_lines(models: &[CleanedModel]) -> Vec<String> {
    models
        .iter()
        .map(|m| format!("  {} ({})", m.model_id, format_bytes(m.size_bytes as f64)))
        .collect()
}

/// Byte progress bar for a download of `total` bytes, hidden when stderr is not a terminal
pub fn download_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar
}

/// Progress callback driving `bar`
pub fn progress_callback(bar: ProgressBar) -> ProgressCallback {
    Arc::new(move |progress: DownloadProgress| {
        if let Some(total) = progress.total_bytes
            && total > 0
        {
            bar.set_length(total);
        }
        bar.set_position(progress.downloaded_bytes);
        bar.set_message(format!(
            "[{}/{}] {}",
            progress.files_completed, progress.files_total, progress.file
        ));
    })
}

/// Ask a yes/no question; an empty answer picks `default`
pub fn confirm(prompt: &str, default: bool) -> std::io::Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    let mut stdout = std::io::stdout();
    write!(stdout, "{prompt} {hint} ")?;
    stdout.flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(parse_answer(&answer, default))
}

fn parse_answer(answer: &str, default: bool) -> bool {
    match answer.trim().to_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn model() -> ModelMetadata {
        ModelMetadata {
            parameter_count: Some(7),
            format: vec!["gguf".to_string(), "safetensors".to_string(), "onnx".to_string()],
            total_size_bytes: 4 * 1024 * 1024 * 1024,
            downloads: 1500,
            ..ModelMetadata::new("huggingface", "org/model-7b")
        }
    }

    #[test]
    fn test_search_table_rows() {
        let rendered = search_table(&[model()]).to_string();
        assert!(rendered.contains("org/model-7b"));
        assert!(rendered.contains("7B"));
        assert!(rendered.contains("gguf, safetensors"));
        assert!(!rendered.contains("onnx"));
        assert!(rendered.contains("1.5K"));
    }

    #[test]
    fn test_info_table_skips_missing_fields() {
        let mut m = model();
        m.license = None;
        m.architecture = Some("llama".to_string());

        let rendered = info_table(&m).to_string();
        assert!(rendered.contains("Architecture"));
        assert!(rendered.contains("llama"));
        assert!(!rendered.contains("License"));
    }

    #[test]
    fn test_local_table_never_used() {
        let entry = IndexEntry {
            source: "huggingface".to_string(),
            model_id: "org/model".to_string(),
            path: PathBuf::from("/m/huggingface/org/model"),
            metadata: Default::default(),
            files: vec![],
            downloaded_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap(),
            last_used: None,
            size_bytes: 2048,
            unknown: Default::default(),
        };

        let rendered = local_table(&[entry]).to_string();
        assert!(rendered.contains("2025-03-01 12:30"));
        assert!(rendered.contains("never"));
        assert!(rendered.contains("2.0KB"));
    }

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("\n", true));
        assert!(!parse_answer("", false));
        assert!(parse_answer("Y\n", false));
        assert!(parse_answer("yes", false));
        assert!(!parse_answer("nope", true));
    }
}
