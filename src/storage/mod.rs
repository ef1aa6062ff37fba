//! Local model storage
//!
//! Models live under `<base_path>/<source>/<model_id>/` and are cataloged in a single
//! JSON index file next to the base directory. [`ModelStorage`] is the only component
//! that reads or writes that file.

pub mod cleanup;
pub mod export;
pub mod index;
pub mod manager;
pub mod paths;

pub use cleanup::{CleanFailure, CleanPolicy, CleanReport, CleanedModel};
pub use export::ExportFormat;
pub use index::{FileSystemIndexBackend, Index, IndexBackend, IndexEntry, index_key};
pub use manager::{ModelStorage, SourceStats, StorageStats};
pub use paths::resolve_model_path;
