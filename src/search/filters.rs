//! Typed search filters
//!
//! Filters arrive as loosely-typed `key=value` pairs from the CLI and the HTTP API.
//! Each recognized key becomes one [`SearchFilter`] variant with its own checker;
//! unrecognized keys and unparsable values are dropped with a debug log.

use crate::models::ModelMetadata;
use crate::utils::size::{SizeConstraint, parse_params};
use serde::Serialize;

/// Relative tolerance for parameter-count matching (30b matches 24b..=36b)
pub const PARAMS_TOLERANCE: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SearchFilter {
    /// Exact, case-insensitive author match
    Author(String),
    /// Model has at least one of these formats
    Format(Vec<String>),
    /// Parameter count in billions, matched within [`PARAMS_TOLERANCE`]
    Params(u64),
    Size(SizeConstraint),
    /// Pipeline task, such as "text-generation"
    Task(String),
    License(String),
    Architecture(String),
    MinDownloads(u64),
    Quantization(String),
}

impl SearchFilter {
    /// Build a filter from a key/value pair; `None` for unknown keys or bad values
    pub fn parse(key: &str, value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        match key.trim().to_lowercase().as_str() {
            "author" | "provider" => Some(Self::Author(value.to_string())),
            "format" => Some(Self::Format(
                value
                    .split(',')
                    .map(|f| f.trim().to_lowercase())
                    .filter(|f| !f.is_empty())
                    .collect(),
            )),
            "params" => parse_params(value).map(Self::Params),
            "size" => SizeConstraint::parse(value).map(Self::Size),
            "task" => Some(Self::Task(value.to_string())),
            "license" => Some(Self::License(value.to_string())),
            "architecture" => Some(Self::Architecture(value.to_string())),
            "min_downloads" => value.parse().ok().map(Self::MinDownloads),
            "quant" | "quantization" => Some(Self::Quantization(value.to_string())),
            _ => None,
        }
    }

    pub fn matches(&self, model: &ModelMetadata) -> bool {
        match self {
            Self::Author(author) => model.author.eq_ignore_ascii_case(author),
            Self::Format(formats) => formats.iter().any(|f| model.format.contains(f)),
            Self::Params(target) => match model.parameter_count {
                Some(count) => {
                    let target = *target as f64;
                    let lower = target * (1.0 - PARAMS_TOLERANCE);
                    let upper = target * (1.0 + PARAMS_TOLERANCE);
                    (lower..=upper).contains(&(count as f64))
                }
                // Unknown size cannot be ruled out
                None => true,
            },
            Self::Size(constraint) => constraint.matches(model.total_size_bytes),
            Self::Task(task) => model.tags.iter().any(|t| t.eq_ignore_ascii_case(task)),
            Self::License(license) => model
                .license
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(license)),
            Self::Architecture(arch) => model
                .architecture
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(arch)),
            Self::MinDownloads(min) => model.downloads >= *min,
            Self::Quantization(quant) => model
                .quantization
                .as_deref()
                .is_some_and(|q| q.eq_ignore_ascii_case(quant)),
        }
    }
}

/// A conjunction of filters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchFilters {
    filters: Vec<SearchFilter>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse key/value pairs, ignoring anything unrecognized
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut filters = Self::new();
        for (key, value) in pairs {
            filters.insert_pair(key.as_ref(), value.as_ref());
        }
        filters
    }

    /// Add a pair; returns false if it was ignored
    pub fn insert_pair(&mut self, key: &str, value: &str) -> bool {
        match SearchFilter::parse(key, value) {
            Some(filter) => {
                self.push(filter);
                true
            }
            None => {
                tracing::debug!(key = %key, value = %value, "Ignoring unrecognized filter");
                false
            }
        }
    }

    /// Add a filter, replacing an earlier filter of the same kind
    pub fn push(&mut self, filter: SearchFilter) {
        self.filters
            .retain(|f| std::mem::discriminant(f) != std::mem::discriminant(&filter));
        self.filters.push(filter);
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchFilter> {
        self.filters.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn matches(&self, model: &ModelMetadata) -> bool {
        self.filters.iter().all(|f| f.matches(model))
    }

    pub fn apply(&self, models: Vec<ModelMetadata>) -> Vec<ModelMetadata> {
        models.into_iter().filter(|m| self.matches(m)).collect()
    }

    pub fn author(&self) -> Option<&str> {
        self.iter().find_map(|f| match f {
            SearchFilter::Author(a) => Some(a.as_str()),
            _ => None,
        })
    }

    pub fn task(&self) -> Option<&str> {
        self.iter().find_map(|f| match f {
            SearchFilter::Task(t) => Some(t.as_str()),
            _ => None,
        })
    }

    pub fn formats(&self) -> &[String] {
        self.iter()
            .find_map(|f| match f {
                SearchFilter::Format(formats) => Some(formats.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }
}
