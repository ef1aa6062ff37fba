//! Recognize model URLs and extract `(source, model_id)`

use crate::error::{DevonError, Result};
use regex::Regex;
use std::sync::LazyLock;

static URL_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "huggingface",
            Regex::new(r"^https?://(?:www\.)?huggingface\.co/([^/]+/[^/?#]+)")
                .expect("valid regex"),
        ),
        (
            "huggingface",
            Regex::new(r"^https?://hf\.co/([^/]+/[^/?#]+)").expect("valid regex"),
        ),
    ]
});

/// Parse a model URL into `(source, model_id)`
pub fn parse_model_url(url: &str) -> Option<(String, String)> {
    URL_PATTERNS.iter().find_map(|(source, pattern)| {
        pattern.captures(url).map(|caps| {
            let model_id = caps[1].trim_end_matches('/').to_string();
            (source.to_string(), model_id)
        })
    })
}

pub fn is_url(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://")
}

/// True if the URL points at a recognized source
pub fn validate_url(url: &str) -> bool {
    parse_model_url(url).is_some()
}

/// Resolve a CLI or API model reference into `(source, model_id)`
///
/// A URL names its own source and must agree with `explicit` if both are given. A
/// plain id uses `explicit`, falling back to `default_source`.
pub fn resolve_model_reference(
    reference: &str,
    explicit: Option<&str>,
    default_source: &str,
) -> Result<(String, String)> {
    if !is_url(reference) {
        let source = explicit.unwrap_or(default_source);
        return Ok((source.to_string(), reference.to_string()));
    }

    let (source, model_id) = parse_model_url(reference)
        .ok_or_else(|| DevonError::validation(format!("Unrecognized model URL: {reference}")))?;

    if let Some(explicit) = explicit
        && explicit != source
    {
        return Err(DevonError::validation(format!(
            "URL points to source '{source}' but '{explicit}' was requested"
        )));
    }

    Ok((source, model_id))
}
