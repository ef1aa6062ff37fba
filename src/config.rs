//! Configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// User settings
///
/// Every section is optional in the file; missing keys keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub download: DownloadSettings,
    pub sources: SourceSettings,
    pub search: SearchSettings,
    pub api: ApiSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root of the model tree; `~` is expanded
    pub base_path: PathBuf,
    /// Refuse downloads that would grow the catalog past this size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size_gb: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Check free disk space before a CLI download
    pub check_disk_space: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceSettings {
    pub default: String,
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty allows local origins only
    pub cors_origins: Vec<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            max_size_gb: None,
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            check_disk_space: true,
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            default: "huggingface".to_string(),
            enabled: vec!["huggingface".to_string()],
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { default_limit: 20 }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings with environment variable overrides
    ///
    /// The file is `path`, else `DEVON_CONFIG_PATH`, else the per-user default. A
    /// missing file yields the defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path
            .or_else(|| std::env::var_os("DEVON_CONFIG_PATH").map(PathBuf::from))
            .unwrap_or_else(default_config_path);

        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {:?}", path))?
        } else {
            tracing::debug!(path = ?path, "No config file, using defaults");
            Self::default()
        };

        settings.apply_env()?;
        settings.storage.base_path = expand_home(&settings.storage.base_path);

        Ok(settings)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = std::env::var_os("DEVON_STORAGE_PATH").filter(|p| !p.is_empty()) {
            self.storage.base_path = PathBuf::from(path);
        }
        if let Ok(port) = std::env::var("DEVON_API_PORT") {
            self.api.port = port.parse().context("Invalid DEVON_API_PORT value")?;
        }
        if let Ok(origins) = std::env::var("DEVON_CORS_ORIGINS") {
            self.api.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.base_path.as_os_str().is_empty() {
            anyhow::bail!("storage.base_path must not be empty");
        }
        if self.search.default_limit == 0 {
            anyhow::bail!("search.default_limit must be at least 1");
        }
        if self.sources.default.is_empty() {
            anyhow::bail!("sources.default must not be empty");
        }
        if self.storage.max_size_gb == Some(0) {
            anyhow::bail!("storage.max_size_gb must be at least 1 when set");
        }
        Ok(())
    }

    /// Catalog size limit in bytes, if configured
    pub fn max_storage_bytes(&self) -> Option<u64> {
        self.storage
            .max_size_gb
            .map(|gb| gb.saturating_mul(1024 * 1024 * 1024))
    }

    /// Write settings atomically, readable by the owner only
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create config directory: {:?}", parent))?;
        }

        let temp_file = path.with_extension("toml.tmp");
        std::fs::write(&temp_file, content).context("Failed to write config file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_file, std::fs::Permissions::from_mode(0o600))
                .context("Failed to restrict config file permissions")?;
        }

        std::fs::rename(&temp_file, path).context("Failed to replace config file")?;
        Ok(())
    }
}

/// Bearer-token policy of the HTTP API, from `DEVON_API_KEY`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeyPolicy {
    /// Unset or empty: every protected request is refused until configured
    Unconfigured,
    /// `disable`: no authentication
    Disabled,
    Required(String),
}

impl ApiKeyPolicy {
    pub fn from_env() -> Self {
        Self::from_value(std::env::var("DEVON_API_KEY").ok().as_deref())
    }

    pub fn from_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::Unconfigured,
            Some("disable") => Self::Disabled,
            Some(key) => Self::Required(key.to_string()),
        }
    }
}

/// Whether to send `Strict-Transport-Security`, from `DEVON_ENABLE_HSTS`
pub fn hsts_enabled() -> bool {
    std::env::var("DEVON_ENABLE_HSTS").is_ok_and(|v| !v.is_empty())
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("devon")
        .join("config.toml")
}

fn default_base_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("devon")
        .join("models")
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
