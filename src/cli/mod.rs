//! Command-line interface
//!
//! Every subcommand runs against a [`Context`] built once from the loaded settings.
//! Results go to stdout; logs go to stderr.

pub mod commands;
pub mod display;

use crate::config::Settings;
use crate::download::DownloadManager;
use crate::sources::{ModelSource, SourceRegistry};
use crate::storage::ModelStorage;
use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "devon")]
#[command(about = "Discover, download and catalog ML models", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Log format (json or pretty)
    #[arg(long, global = true, default_value = "pretty")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search a remote source for models
    Search(SearchArgs),
    /// Download a model by id or URL
    Download(DownloadArgs),
    /// List locally downloaded models
    List {
        /// Only models from this source
        #[arg(short, long)]
        source: Option<String>,
    },
    /// Show local and remote details of a model
    Info {
        model_id: String,
        #[arg(short, long)]
        source: Option<String>,
    },
    /// Remove unused or all models
    Clean(CleanArgs),
    /// Export the model list for other tools
    Export {
        /// kitt (one path per line) or json
        #[arg(short, long, default_value = "kitt")]
        format: String,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        source: Option<String>,
    },
    /// Show storage statistics
    Status,
    /// Remove one downloaded model
    Remove {
        model_id: String,
        #[arg(short, long)]
        source: Option<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Start the REST API server
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        host: Option<String>,
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Args, Debug, Default)]
pub struct SearchArgs {
    /// Free text; tokens like `30b`, `gguf` or `Q4_K_M` become filters
    pub query: Option<String>,

    /// Filter by provider/author
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Parameter count (e.g. 7b, 30b)
    #[arg(long)]
    pub params: Option<String>,

    /// Size constraint (e.g. "<100gb")
    #[arg(long)]
    pub size: Option<String>,

    /// Model format (gguf, safetensors, ...)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Task, such as text-generation
    #[arg(short, long)]
    pub task: Option<String>,

    #[arg(short, long)]
    pub license: Option<String>,

    /// Maximum number of results
    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long)]
    pub source: Option<String>,
}

impl SearchArgs {
    /// Flag values as filter key/value pairs
    pub fn filter_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("author", &self.provider),
            ("params", &self.params),
            ("size", &self.size),
            ("format", &self.format),
            ("task", &self.task),
            ("license", &self.license),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }
}

#[derive(Args, Debug, Default)]
pub struct DownloadArgs {
    /// Model id (org/name) or model page URL
    pub model: String,

    #[arg(short, long)]
    pub source: Option<String>,

    /// Download again even if present
    #[arg(short, long)]
    pub force: bool,

    /// Only fetch files matching this glob; repeatable
    #[arg(long = "include")]
    pub include: Vec<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Remove models not used within --days
    #[arg(long)]
    pub unused: bool,

    #[arg(long, default_value_t = 30)]
    pub days: u32,

    /// Remove every downloaded model
    #[arg(long)]
    pub all: bool,

    /// Show what would be removed
    #[arg(long)]
    pub dry_run: bool,

    #[arg(short, long)]
    pub yes: bool,
}

/// Shared services for one CLI invocation
pub struct Context {
    pub settings: Arc<Settings>,
    pub storage: Arc<ModelStorage>,
    pub sources: SourceRegistry,
    pub downloads: Arc<DownloadManager>,
}

impl Context {
    pub async fn new(settings: Settings) -> Result<Self> {
        let storage = ModelStorage::open(settings.storage.base_path.clone())
            .await
            .with_context(|| {
                format!("Failed to open model storage at {:?}", settings.storage.base_path)
            })?;
        let storage = Arc::new(storage);

        let sources = SourceRegistry::with_builtin_sources();
        sources.retain(&settings.sources.enabled);

        Ok(Self {
            downloads: Arc::new(DownloadManager::new(storage.clone())),
            settings: Arc::new(settings),
            storage,
            sources,
        })
    }

    /// `explicit`, or the configured default source
    pub fn source_name(&self, explicit: Option<&str>) -> String {
        explicit
            .unwrap_or(&self.settings.sources.default)
            .to_string()
    }

    pub fn source(&self, explicit: Option<&str>) -> Result<Arc<dyn ModelSource>> {
        Ok(self.sources.get(&self.source_name(explicit))?)
    }
}

/// Dispatch a parsed command
pub async fn run(command: Command, ctx: Context) -> Result<()> {
    match command {
        Command::Search(args) => commands::search(&ctx, args).await,
        Command::Download(args) => commands::download(&ctx, args).await,
        Command::List { source } => commands::list(&ctx, source.as_deref()).await,
        Command::Info { model_id, source } => {
            commands::info(&ctx, &model_id, source.as_deref()).await
        }
        Command::Clean(args) => commands::clean(&ctx, args).await,
        Command::Export {
            format,
            output,
            source,
        } => commands::export(&ctx, &format, output, source.as_deref()).await,
        Command::Status => commands::status(&ctx).await,
        Command::Remove {
            model_id,
            source,
            yes,
        } => commands::remove(&ctx, &model_id, source.as_deref(), yes).await,
        Command::Serve { host, port } => commands::serve(ctx, host, port).await,
    }
}
