//! On-disk layout and path validation
//!
//! Source names and model ids reach the filesystem from remote search results and
//! user input. Anything that could escape the storage root is rejected before a
//! path is built.

use crate::error::{DevonError, Result};
use std::path::{Component, Path, PathBuf};

/// Validate a source name: one plain path segment
pub fn validate_source_name(source: &str) -> Result<()> {
    if source.is_empty() {
        return Err(DevonError::validation("Source name must not be empty"));
    }
    if source.contains(['/', '\\', '\0']) || source == "." || source == ".." {
        return Err(DevonError::validation(format!(
            "Invalid source name '{source}'"
        )));
    }
    Ok(())
}

/// Validate a model id: one or more plain segments separated by `/`
pub fn validate_model_id(model_id: &str) -> Result<()> {
    if model_id.trim().is_empty() {
        return Err(DevonError::validation("Model id must not be empty"));
    }
    if model_id.starts_with('/') {
        return Err(DevonError::validation(format!(
            "Model id '{model_id}' must not be an absolute path"
        )));
    }
    if model_id.contains(['\\', '\0']) {
        return Err(DevonError::validation(format!(
            "Model id '{model_id}' contains an illegal character"
        )));
    }
    for segment in model_id.split('/') {
        match segment {
            "" => {
                return Err(DevonError::validation(format!(
                    "Model id '{model_id}' contains an empty path segment"
                )));
            }
            "." | ".." => {
                return Err(DevonError::validation(format!(
                    "Model id '{model_id}' must not contain '{segment}' segments"
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// `base / source / model_id`, rejecting anything that would leave `base`
pub fn resolve_model_path(base: &Path, source: &str, model_id: &str) -> Result<PathBuf> {
    validate_source_name(source)?;
    validate_model_id(model_id)?;

    let path = base.join(source).join(model_id);

    // Belt over the segment checks: a platform prefix or root must never appear
    let escapes = path
        .strip_prefix(base)
        .map(|rel| {
            rel.components()
                .any(|c| !matches!(c, Component::Normal(_)))
        })
        .unwrap_or(true);
    if escapes {
        return Err(DevonError::validation(format!(
            "Model id '{model_id}' resolves outside the storage root"
        )));
    }

    Ok(path)
}

/// True if `path` is strictly inside `root`, compared lexically
pub fn is_within(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .map(|rel| {
            rel.components().next().is_some()
                && rel.components().all(|c| matches!(c, Component::Normal(_)))
        })
        .unwrap_or(false)
}
