//! Human-readable size and count parsing/formatting

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*(b|kb|mb|gb|tb|pb)").expect("valid regex"));

static PARAMS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*b\b").expect("valid regex"));

static BARE_PARAMS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)$").expect("valid regex"));

static CONSTRAINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([<>]=?)\s*(\d+)\s*(mb|gb|tb)$").expect("valid regex"));

const KIB: u64 = 1024;

fn unit_multiplier(unit: &str) -> Option<u64> {
    match unit {
        "b" => Some(1),
        "kb" => Some(KIB),
        "mb" => Some(KIB.pow(2)),
        "gb" => Some(KIB.pow(3)),
        "tb" => Some(KIB.pow(4)),
        "pb" => Some(KIB.pow(5)),
        _ => None,
    }
}

/// Parse a human-readable size into bytes
///
/// `"500mb"` -> 524288000, `"1.5tb"` -> 1649267441664. Fractions of a byte are
/// truncated.
pub fn parse_size(size_str: &str) -> Option<u64> {
    let lowered = size_str.trim().to_lowercase();
    let caps = SIZE_RE.captures(&lowered)?;
    let value: f64 = caps[1].parse().ok()?;
    let multiplier = unit_multiplier(&caps[2])?;
    Some((value * multiplier as f64) as u64)
}

/// Format a byte count as `"1.5GB"`. Negative input renders as `"0B"`.
pub fn format_bytes(bytes: f64) -> String {
    if bytes < 0.0 {
        return "0B".to_string();
    }

    let mut value = bytes;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if value < 1024.0 {
            return format!("{value:.1}{unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1}PB")
}

/// Parse a parameter count in billions: `"30b"` -> 30, `"70"` -> 70
pub fn parse_params(params_str: &str) -> Option<u64> {
    let lowered = params_str.trim().to_lowercase();
    PARAMS_RE
        .captures(&lowered)
        .or_else(|| BARE_PARAMS_RE.captures(&lowered))
        .and_then(|caps| caps[1].parse().ok())
}

/// Format a count with K/M suffixes
pub fn format_number(num: u64) -> String {
    if num >= 1_000_000 {
        format!("{:.1}M", num as f64 / 1_000_000.0)
    } else if num >= 1_000 {
        format!("{:.1}K", num as f64 / 1_000.0)
    } else {
        num.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeOperator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

/// A size bound such as `<100gb`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeConstraint {
    pub operator: SizeOperator,
    pub bytes: u64,
}

impl SizeConstraint {
    pub fn parse(input: &str) -> Option<Self> {
        let lowered = input.trim().to_lowercase();
        let caps = CONSTRAINT_RE.captures(&lowered)?;

        let operator = match &caps[1] {
            "<" => SizeOperator::Lt,
            "<=" => SizeOperator::Le,
            ">" => SizeOperator::Gt,
            ">=" => SizeOperator::Ge,
            _ => return None,
        };
        let value: u64 = caps[2].parse().ok()?;
        let bytes = value.checked_mul(unit_multiplier(&caps[3])?)?;

        Some(Self { operator, bytes })
    }

    pub fn matches(&self, actual: u64) -> bool {
        match self.operator {
            SizeOperator::Lt => actual < self.bytes,
            SizeOperator::Le => actual <= self.bytes,
            SizeOperator::Gt => actual > self.bytes,
            SizeOperator::Ge => actual >= self.bytes,
        }
    }
}
