//! DEVON - Discovery Engine and Vault for Open Neural models
//!
//! Searches remote model repositories, downloads models into a local directory tree
//! and keeps a JSON catalog of what is on disk. The same core backs the `devon` CLI
//! and its REST API.

pub mod api;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod metrics;
pub mod models;
pub mod search;
pub mod sources;
pub mod storage;
pub mod utils;

pub use config::Settings;
pub use download::{DownloadManager, DownloadOptions};
pub use error::{DevonError, Result};
pub use models::ModelMetadata;
pub use search::{SearchFilter, SearchFilters};
pub use sources::{ModelSource, SourceRegistry};
pub use storage::{IndexEntry, ModelStorage};
