//! Export of the local catalog for other tools

use super::index::{IndexEntry, timestamp};
use crate::error::{DevonError, Result};
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// One model directory per line, as consumed by `kitt --model-list`
    #[default]
    Kitt,
    Json,
}

impl FromStr for ExportFormat {
    type Err = DevonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "kitt" => Ok(Self::Kitt),
            "json" => Ok(Self::Json),
            other => Err(DevonError::validation(format!(
                "Unknown export format '{other}', expected 'kitt' or 'json'"
            ))),
        }
    }
}

#[derive(Serialize)]
struct ExportedModel<'a> {
    source: &'a str,
    model_id: &'a str,
    path: String,
    size_bytes: u64,
    downloaded_at: String,
    files: &'a [String],
}

fn exported(entries: &[IndexEntry]) -> Vec<ExportedModel<'_>> {
    entries
        .iter()
        .map(|e| ExportedModel {
            source: &e.source,
            model_id: &e.model_id,
            path: e.path.to_string_lossy().into_owned(),
            size_bytes: e.size_bytes,
            downloaded_at: timestamp::format(&e.downloaded_at),
            files: &e.files,
        })
        .collect()
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kitt => "kitt",
            Self::Json => "json",
        }
    }

    /// Render as text: one path per line, or a pretty JSON array
    pub fn render(&self, entries: &[IndexEntry]) -> Result<String> {
        match self {
            Self::Kitt => Ok(entries
                .iter()
                .map(|e| e.path.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("\n")),
            Self::Json => serde_json::to_string_pretty(&exported(entries))
                .map_err(|e| DevonError::validation(format!("Failed to render export: {e}"))),
        }
    }

    /// Structured form for JSON APIs: an array of paths, or an array of objects
    pub fn to_value(&self, entries: &[IndexEntry]) -> Result<Value> {
        let value = match self {
            Self::Kitt => Value::Array(
                entries
                    .iter()
                    .map(|e| Value::String(e.path.to_string_lossy().into_owned()))
                    .collect(),
            ),
            Self::Json => serde_json::to_value(exported(entries))
                .map_err(|e| DevonError::validation(format!("Failed to render export: {e}")))?,
        };
        Ok(value)
    }
}
