//! Universal model metadata shared by every source
//!
//! A [`ModelMetadata`] is what a source returns from search and info lookups. The
//! `extra` bag carries source-specific data and never leaves the process: it is
//! skipped when serializing for the index or for API responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Description of a remote model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMetadata {
    // Identity
    pub source: String,
    pub model_id: String,
    pub model_name: String,
    pub author: String,

    // Size
    pub total_size_bytes: u64,
    pub file_count: u64,

    /// Parameter count in billions (30 = 30B)
    pub parameter_count: Option<u64>,
    /// "llama", "qwen", ...
    pub architecture: Option<String>,
    /// Ordered set of formats such as "gguf" or "safetensors"
    pub format: Vec<String>,
    /// "Q4_K_M", "fp16", ...
    pub quantization: Option<String>,

    pub tags: Vec<String>,
    pub license: Option<String>,
    pub downloads: u64,
    pub likes: u64,
    pub created_at: String,
    pub updated_at: String,

    pub web_url: String,
    pub repo_url: String,

    #[serde(skip)]
    pub extra: Map<String, Value>,
}

impl ModelMetadata {
    /// Minimal metadata for a model known only by id
    pub fn new(source: impl Into<String>, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        let (author, model_name) = split_model_id(&model_id);

        Self {
            source: source.into(),
            author: author.to_string(),
            model_name: model_name.to_string(),
            model_id,
            ..Default::default()
        }
    }

    /// JSON object persisted in the index entry
    ///
    /// `extra` is always dropped. Serialization of the remaining fields cannot fail
    /// for well-formed values, but if it ever does the model is still registered with
    /// a stringified fallback instead of aborting.
    pub fn to_persisted(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                let mut map = Map::new();
                map.insert("model_id".to_string(), Value::String(self.model_id.clone()));
                map.insert("raw".to_string(), Value::String(other.to_string()));
                map
            }
            Err(e) => {
                tracing::warn!(
                    model_id = %self.model_id,
                    error = %e,
                    "Metadata not serializable, storing string form"
                );
                let mut map = Map::new();
                map.insert("model_id".to_string(), Value::String(self.model_id.clone()));
                map.insert("raw".to_string(), Value::String(format!("{:?}", self)));
                map
            }
        }
    }
}

/// Split `org/name` into `(org, name)`. Ids without an org use the full id for both.
pub fn split_model_id(model_id: &str) -> (&str, &str) {
    let author = model_id.split('/').next().unwrap_or(model_id);
    let name = model_id.rsplit('/').next().unwrap_or(model_id);
    (author, name)
}
