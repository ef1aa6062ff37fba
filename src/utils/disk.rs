//! Free-space checks before large downloads

use crate::error::{DevonError, Result};
use crate::utils::size::format_bytes;
use std::path::Path;

/// Bytes available to unprivileged users on the filesystem holding `path`
pub fn available_space(path: &Path) -> Result<u64> {
    let stats = nix::sys::statvfs::statvfs(path).map_err(|e| {
        DevonError::io(
            format!("Failed to check disk space for {:?}", path),
            std::io::Error::from(e),
        )
    })?;

    Ok(stats.blocks_available() as u64 * stats.fragment_size() as u64)
}

/// Fail unless `path` has room for `required` bytes plus a 10% margin
pub fn ensure_free_space(path: &Path, required: u64) -> Result<()> {
    if required == 0 {
        return Ok(());
    }

    let available = available_space(path)?;
    let needed = required.saturating_add(required / 10);

    if available < needed {
        return Err(DevonError::validation(format!(
            "Insufficient disk space: {} required, {} available",
            format_bytes(needed as f64),
            format_bytes(available as f64)
        )));
    }

    Ok(())
}

/// Fail if adding `incoming` bytes to a catalog of `current` bytes exceeds `limit`
pub fn ensure_within_quota(current: u64, incoming: u64, limit: Option<u64>) -> Result<()> {
    let Some(limit) = limit else {
        return Ok(());
    };

    let total = current.saturating_add(incoming);
    if total > limit {
        return Err(DevonError::validation(format!(
            "Storage quota exceeded: {} used + {} requested > {} allowed",
            format_bytes(current as f64),
            format_bytes(incoming as f64),
            format_bytes(limit as f64)
        )));
    }

    Ok(())
}
