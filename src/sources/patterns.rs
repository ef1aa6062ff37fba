//! Include-pattern validation and matching
//!
//! Patterns come from users and API clients and end up selecting paths inside the
//! model directory, so they are checked against a small safe alphabet first.

use crate::error::{DevonError, Result};
use regex::Regex;

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '*' | '?' | '/')
}

pub fn validate_include_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(DevonError::validation("Include pattern must not be empty"));
    }
    if let Some(c) = pattern.chars().find(|c| !is_safe_char(*c)) {
        return Err(DevonError::validation(format!(
            "Include pattern '{pattern}' contains illegal character {c:?}"
        )));
    }
    if pattern.starts_with('/') {
        return Err(DevonError::validation(format!(
            "Include pattern '{pattern}' must be relative"
        )));
    }
    if pattern.split('/').any(|segment| segment == "..") || pattern.contains("..") {
        return Err(DevonError::validation(format!(
            "Include pattern '{pattern}' must not contain '..'"
        )));
    }
    Ok(())
}

pub fn validate_include_patterns(patterns: &[String]) -> Result<()> {
    patterns.iter().try_for_each(|p| validate_include_pattern(p))
}

/// True for a relative path that stays inside the directory it is joined onto
pub fn is_safe_relative_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && !path.contains('\0')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// Compiled set of glob patterns; `*` and `?` match across `/`
#[derive(Debug, Clone)]
pub struct IncludeFilter {
    patterns: Vec<Regex>,
}

impl IncludeFilter {
    /// Validate and compile; `None` or an empty list matches every file
    pub fn new(patterns: Option<&[String]>) -> Result<Self> {
        let patterns = patterns.unwrap_or_default();
        validate_include_patterns(patterns)?;

        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(&glob_to_regex(p)).map_err(|e| {
                    DevonError::validation(format!("Invalid include pattern '{p}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, file: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(file))
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    re
}
