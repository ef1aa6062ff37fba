//! Source-agnostic model description

pub mod metadata;

pub use metadata::ModelMetadata;
