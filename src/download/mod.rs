//! Download orchestration

pub mod manager;

pub use manager::{DownloadManager, DownloadOptions};
