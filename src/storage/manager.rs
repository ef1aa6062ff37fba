//! Storage manager owning the on-disk layout and the index

use super::index::{
    FileSystemIndexBackend, Index, IndexBackend, IndexEntry, index_key, now, parse_index,
    serialize_index,
};
use super::paths::{is_within, resolve_model_path};
use crate::error::{DevonError, Result};
use crate::models::ModelMetadata;
use crate::sources::patterns::is_safe_relative_path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;

const INDEX_FILE_NAME: &str = "index.json";

/// Per-source totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub count: usize,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub model_count: usize,
    pub total_size_bytes: u64,
    pub sources: BTreeMap<String, SourceStats>,
}

/// Local model storage
///
/// Readers share a consistent in-memory snapshot of the index. Every mutation takes
/// the exclusive lock, reloads the index from disk (another process may have written
/// it), applies the change, and persists atomically before returning. Concurrent
/// processes get last-writer-wins per mutation, with no torn files.
pub struct ModelStorage {
    base_path: PathBuf,
    index_file: PathBuf,
    backend: Arc<dyn IndexBackend>,
    index: RwLock<Index>,
}

impl ModelStorage {
    /// Open storage rooted at `base_path`, creating the directory if needed
    ///
    /// The index lives next to the base directory, at `<base_path>/../index.json`.
    pub async fn open(base_path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_backend(base_path, Arc::new(FileSystemIndexBackend::new())).await
    }

    /// Open storage with a custom index backend
    pub async fn open_with_backend(
        base_path: impl Into<PathBuf>,
        backend: Arc<dyn IndexBackend>,
    ) -> Result<Self> {
        let base_path = base_path.into();
        if base_path.as_os_str().is_empty() {
            return Err(DevonError::validation("Storage path must not be empty"));
        }

        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| DevonError::io(format!("Failed to create {:?}", base_path), e))?;

        let index_file = base_path
            .parent()
            .map(|parent| parent.join(INDEX_FILE_NAME))
            .unwrap_or_else(|| base_path.join(INDEX_FILE_NAME));

        let index = Self::load_index(backend.as_ref(), &index_file).await?;

        tracing::info!(
            base_path = ?base_path,
            index_file = ?index_file,
            models = index.len(),
            "Storage opened"
        );

        Ok(Self {
            base_path,
            index_file,
            backend,
            index: RwLock::new(index),
        })
    }

    async fn load_index(backend: &dyn IndexBackend, path: &Path) -> Result<Index> {
        match backend.load(path).await? {
            Some(content) => parse_index(path, &content),
            None => {
                tracing::debug!(path = ?path, "No index file found, starting fresh");
                Ok(Index::new())
            }
        }
    }

    async fn persist(&self, index: &Index) -> Result<()> {
        let content = serialize_index(&self.index_file, index)?;
        self.backend.save(&self.index_file, &content).await?;
        tracing::debug!(path = ?self.index_file, models = index.len(), "Index saved");
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    /// `<base_path>/<source>/<model_id>`; unsafe ids are rejected, never sanitized
    pub fn resolve_path(&self, source: &str, model_id: &str) -> Result<PathBuf> {
        resolve_model_path(&self.base_path, source, model_id)
    }

    pub async fn is_present(&self, source: &str, model_id: &str) -> bool {
        self.index
            .read()
            .await
            .contains_key(&index_key(source, model_id))
    }

    pub async fn get_entry(&self, source: &str, model_id: &str) -> Option<IndexEntry> {
        self.index
            .read()
            .await
            .get(&index_key(source, model_id))
            .cloned()
    }

    /// Entries, optionally restricted to one source
    pub async fn list(&self, source: Option<&str>) -> Vec<IndexEntry> {
        self.index
            .read()
            .await
            .values()
            .filter(|e| source.is_none_or(|s| e.source == s))
            .cloned()
            .collect()
    }

    pub async fn total_size(&self) -> u64 {
        self.index.read().await.values().map(|e| e.size_bytes).sum()
    }

    pub async fn stats(&self) -> StorageStats {
        let index = self.index.read().await;
        let mut stats = StorageStats {
            model_count: index.len(),
            ..Default::default()
        };
        for entry in index.values() {
            stats.total_size_bytes += entry.size_bytes;
            let per_source = stats.sources.entry(entry.source.clone()).or_default();
            per_source.count += 1;
            per_source.size_bytes += entry.size_bytes;
        }
        stats
    }

    /// Reload the in-memory snapshot from disk to pick up other processes' writes
    pub async fn refresh(&self) -> Result<()> {
        let mut guard = self.index.write().await;
        *guard = Self::load_index(self.backend.as_ref(), &self.index_file).await?;
        Ok(())
    }

    /// Record a completed download, replacing any previous entry for the same model
    ///
    /// File sizes are measured before the lock is taken; files that do not exist
    /// count as zero bytes.
    pub async fn register(
        &self,
        source: &str,
        model_id: &str,
        metadata: &ModelMetadata,
        files: &[String],
    ) -> Result<IndexEntry> {
        let path = self.resolve_path(source, model_id)?;

        if let Some(bad) = files.iter().find(|f| !is_safe_relative_path(f)) {
            return Err(DevonError::validation(format!(
                "File path '{bad}' escapes the model directory"
            )));
        }

        let mut size_bytes = 0u64;
        for file in files {
            if let Ok(meta) = fs::metadata(path.join(file)).await {
                size_bytes += meta.len();
            }
        }

        let entry = IndexEntry {
            source: source.to_string(),
            model_id: model_id.to_string(),
            path,
            metadata: metadata.to_persisted(),
            files: files.to_vec(),
            downloaded_at: now(),
            last_used: None,
            size_bytes,
            unknown: Default::default(),
        };
        let key = entry.key();

        let mut guard = self.index.write().await;
        let mut index = Self::load_index(self.backend.as_ref(), &self.index_file).await?;
        let replaced = index.insert(key.clone(), entry.clone()).is_some();
        self.persist(&index).await?;
        *guard = index;
        drop(guard);

        tracing::info!(
            key = %key,
            files = entry.files.len(),
            size_bytes = entry.size_bytes,
            replaced = replaced,
            "Model registered"
        );

        Ok(entry)
    }

    /// Remove a model's files and its index entry
    ///
    /// Returns `false` if the model is not in the index. If the directory cannot be
    /// removed the entry is kept and `PartialDelete` is returned, so the files stay
    /// tracked and the delete can be retried.
    pub async fn delete(&self, source: &str, model_id: &str) -> Result<bool> {
        let key = index_key(source, model_id);

        let mut guard = self.index.write().await;
        let mut index = Self::load_index(self.backend.as_ref(), &self.index_file).await?;

        let Some(entry) = index.get(&key) else {
            *guard = index;
            return Ok(false);
        };
        let path = entry.path.clone();

        if !is_within(&self.base_path, &path) {
            *guard = index;
            return Err(DevonError::IndexInconsistency {
                key,
                detail: format!(
                    "recorded path {:?} is outside the storage root {:?}",
                    path, self.base_path
                ),
            });
        }

        match fs::remove_dir_all(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(key = %key, path = ?path, "Model directory already gone");
            }
            Err(source) => {
                *guard = index;
                return Err(DevonError::PartialDelete { key, path, source });
            }
        }

        index.remove(&key);
        self.persist(&index).await?;
        *guard = index;
        drop(guard);

        self.prune_empty_parents(&path).await;

        tracing::info!(key = %key, path = ?path, "Model deleted");
        Ok(true)
    }

    /// Remove now-empty directories between a deleted model and the base path
    async fn prune_empty_parents(&self, removed: &Path) {
        let mut current = removed.parent();
        while let Some(dir) = current {
            if !is_within(&self.base_path, dir) || fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }

    /// Stamp `last_used`; a no-op for models that are not in the index
    pub async fn mark_used(&self, source: &str, model_id: &str) -> Result<()> {
        let key = index_key(source, model_id);

        let mut guard = self.index.write().await;
        let mut index = Self::load_index(self.backend.as_ref(), &self.index_file).await?;

        match index.get_mut(&key) {
            Some(entry) => {
                entry.last_used = Some(now());
                self.persist(&index).await?;
                tracing::debug!(key = %key, "Model marked used");
            }
            None => tracing::debug!(key = %key, "Mark used on unknown model ignored"),
        }

        *guard = index;
        Ok(())
    }

    /// Stamp `last_used` on every `(source, model_id)` with a single index write
    ///
    /// Unknown models are skipped. Returns how many entries were stamped.
    pub async fn mark_used_many<'a, I>(&self, models: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut guard = self.index.write().await;
        let mut index = Self::load_index(self.backend.as_ref(), &self.index_file).await?;

        let stamp = now();
        let mut marked = 0;
        for (source, model_id) in models {
            if let Some(entry) = index.get_mut(&index_key(source, model_id)) {
                entry.last_used = Some(stamp);
                marked += 1;
            }
        }

        if marked > 0 {
            self.persist(&index).await?;
            tracing::debug!(count = marked, "Models marked used");
        }

        *guard = index;
        Ok(marked)
    }
}

impl std::fmt::Debug for ModelStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStorage")
            .field("base_path", &self.base_path)
            .field("index_file", &self.index_file)
            .finish()
    }
}
