//! Extract inline filters from free-text queries
//!
//! `"qwen 30b gguf"` searches for `"qwen"` with `params=30b` and `format=gguf`.

use super::filters::{SearchFilter, SearchFilters};
use regex::Regex;
use std::sync::LazyLock;

static PARAMS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)b\b").expect("valid regex"));

static FORMAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(gguf|safetensors|pytorch|onnx)\b").expect("valid regex"));

static QUANT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(Q4_K_M|Q5_K_M|Q8_0|fp16|bf16|int8|int4)\b").expect("valid regex")
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    /// Remaining free text, `None` if nothing is left
    pub text: Option<String>,
    pub filters: SearchFilters,
}

pub fn parse_query(query: &str) -> ParsedQuery {
    let mut filters = SearchFilters::new();
    let mut remaining = query.to_string();

    if let Some(m) = PARAMS_RE.captures(query) {
        if let Ok(params) = m[1].parse() {
            filters.push(SearchFilter::Params(params));
        }
        remaining = remaining.replacen(&m[0], "", 1);
    }

    if let Some(m) = FORMAT_RE.captures(query) {
        filters.push(SearchFilter::Format(vec![m[1].to_lowercase()]));
        remaining = remaining.replacen(&m[0], "", 1);
    }

    if let Some(m) = QUANT_RE.captures(query) {
        filters.push(SearchFilter::Quantization(m[1].to_string()));
        remaining = remaining.replacen(&m[0], "", 1);
    }

    let text = remaining.split_whitespace().collect::<Vec<_>>().join(" ");

    ParsedQuery {
        text: (!text.is_empty()).then_some(text),
        filters,
    }
}
