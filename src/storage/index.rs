//! Persisted catalog of downloaded models

use crate::error::{DevonError, Result};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Catalog keyed by [`index_key`]; iteration order is not part of the API
pub type Index = BTreeMap<String, IndexEntry>;

pub fn index_key(source: &str, model_id: &str) -> String {
    format!("{source}::{model_id}")
}

/// Current time at the precision the index stores
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// One locally downloaded model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub source: String,
    pub model_id: String,
    /// Absolute directory holding the model's files
    pub path: PathBuf,
    /// Persistable subset of the model metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Paths relative to `path`
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(with = "timestamp")]
    pub downloaded_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub last_used: Option<DateTime<Utc>>,
    /// Sum of file sizes at registration, not re-verified later
    #[serde(default)]
    pub size_bytes: u64,
    /// Fields written by other versions, kept so they survive a rewrite
    #[serde(flatten)]
    pub unknown: Map<String, Value>,
}

impl IndexEntry {
    pub fn key(&self) -> String {
        index_key(&self.source, &self.model_id)
    }

    /// Most recent activity: last use, or the download itself
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_used.unwrap_or(self.downloaded_at)
    }
}

/// Parse an index file, failing hard on anything that is not a valid catalog
pub fn parse_index(path: &Path, content: &str) -> Result<Index> {
    if content.trim().is_empty() {
        tracing::warn!(path = ?path, "Index file is empty, treating as no models");
        return Ok(Index::new());
    }

    serde_json::from_str(content).map_err(|source| DevonError::IndexCorrupt {
        path: path.to_path_buf(),
        source,
    })
}

pub fn serialize_index(path: &Path, index: &Index) -> Result<String> {
    serde_json::to_string_pretty(index).map_err(|source| DevonError::IndexCorrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Storage for the serialized index
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Replace the content at `path` so that readers see either the old or the new
    /// content, never a mix
    async fn save(&self, path: &Path, content: &str) -> Result<()>;

    /// `None` if nothing has been saved yet
    async fn load(&self, path: &Path) -> Result<Option<String>>;
}

/// Index backend on the local filesystem
///
/// Writes go to a temp file in the destination directory, are synced, then renamed
/// over the destination. The temp name carries the process id so that a CLI and a
/// server writing the same index never share a temp file.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSystemIndexBackend;

impl FileSystemIndexBackend {
    pub fn new() -> Self {
        Self
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "index.json".into());
        name.push(format!(".{}.tmp", std::process::id()));
        path.with_file_name(name)
    }
}

#[async_trait]
impl IndexBackend for FileSystemIndexBackend {
    async fn save(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DevonError::io(format!("Failed to create {:?}", parent), e))?;
        }

        let temp_file = Self::temp_path(path);

        let write = async {
            let mut file = fs::File::create(&temp_file).await?;
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await?;
            fs::rename(&temp_file, path).await
        };

        if let Err(e) = write.await {
            let _ = fs::remove_file(&temp_file).await;
            return Err(DevonError::io(format!("Failed to write index {:?}", path), e));
        }

        Ok(())
    }

    async fn load(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DevonError::io(format!("Failed to read index {:?}", path), e)),
        }
    }
}

/// RFC 3339 timestamps, also accepting the naive ISO-8601 local times older indexes
/// were written with
pub mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        Some(
            Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|ts| ts.with_timezone(&Utc))
                .unwrap_or_else(|| naive.and_utc()),
        )
    }

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_str(&super::format(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'"))),
                None => Ok(None),
            }
        }
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    /// In-memory backend with error injection
    #[derive(Default)]
    pub struct MemoryIndexBackend {
        files: Arc<RwLock<HashMap<PathBuf, String>>>,
        save_error: Arc<RwLock<Option<String>>>,
        saves: AtomicUsize,
    }

    impl MemoryIndexBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn get_file(&self, path: &Path) -> Option<String> {
            self.files.read().await.get(path).cloned()
        }

        pub async fn put_file(&self, path: &Path, content: &str) {
            self.files
                .write()
                .await
                .insert(path.to_path_buf(), content.to_string());
        }

        /// Fail the next save with an I/O error carrying `message`
        pub async fn fail_next_save(&self, message: &str) {
            *self.save_error.write().await = Some(message.to_string());
        }

        /// Successful saves so far
        pub fn save_count(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IndexBackend for MemoryIndexBackend {
        async fn save(&self, path: &Path, content: &str) -> Result<()> {
            if let Some(message) = self.save_error.write().await.take() {
                return Err(DevonError::io(
                    "Injected save failure",
                    std::io::Error::other(message),
                ));
            }
            self.put_file(path, content).await;
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn load(&self, path: &Path) -> Result<Option<String>> {
            Ok(self.get_file(path).await)
        }
    }
}
