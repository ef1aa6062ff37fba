//! Error types shared by the storage core, the sources and the API

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed error raised by a remote source client
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum DevonError {
    #[error("Source '{name}' not found. Available sources: {}", .available.join(", "))]
    SourceNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("Model not found: {source_name}::{model_id}")]
    ModelNotFound {
        source_name: String,
        model_id: String,
    },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("{source_name} {operation} failed for '{model_id}': {source}")]
    Remote {
        source_name: String,
        model_id: String,
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("Index inconsistency for {key}: {detail}")]
    IndexInconsistency { key: String, detail: String },

    #[error(
        "Partial delete of {key}: could not remove {path:?}, index entry kept so the files stay tracked: {source}"
    )]
    PartialDelete {
        key: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Index file {path:?} is corrupted. Please delete or fix the file manually: {source}")]
    IndexCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, DevonError>;

impl DevonError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn remote(
        source_name: impl Into<String>,
        model_id: impl Into<String>,
        operation: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Remote {
            source_name: source_name.into(),
            model_id: model_id.into(),
            operation,
            source: source.into(),
        }
    }

    /// True for the "requested thing is absent" family of errors
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. } | Self::ModelNotFound { .. }
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::SourceNotFound { .. } => StatusCode::BAD_REQUEST,
            Self::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Remote { .. } => StatusCode::BAD_GATEWAY,
            Self::IndexInconsistency { .. }
            | Self::PartialDelete { .. }
            | Self::IndexCorrupt { .. }
            | Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DevonError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            timestamp: chrono::Utc::now(),
        });

        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}
