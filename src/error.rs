//! # Error Handling
//!
//! Two error families live here:
//!
//! - [`AppError`]: errors surfaced through the HTTP request/response
//!   endpoints (config, topics). Converted to JSON error responses via
//!   `ResponseError`.
//! - [`PipelineError`]: a collaborator call failing inside one voice turn.
//!   These never cross the connection boundary as structured data; the
//!   session logs the stage and closes, and the client simply observes the
//!   connection closing.

use crate::openai::CollaboratorError;

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Errors returned by the HTTP API handlers.
///
/// ## HTTP Status Code Mapping:
/// - Internal/ConfigError → 500
/// - BadRequest/ValidationError → 400
/// - NotFound → 404
/// - Upstream → 502 (a collaborator failed while serving the request)
#[derive(Debug)]
pub enum AppError {
    /// Server-side problems that are nobody else's fault
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),

    /// A remote collaborator call failed while handling the request
    Upstream(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Upstream(msg) => write!(f, "Upstream error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::ConfigError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg)
            }
            AppError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg)
            }
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Shorthand for handler results.
pub type AppResult<T> = Result<T, AppError>;

/// The pipeline stage at which a voice turn failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Transcription,
    Completion,
    Synthesis,
}

impl PipelineStage {
    /// Stable name for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Transcription => "transcription",
            PipelineStage::Completion => "completion",
            PipelineStage::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A collaborator call failed during one voice turn.
///
/// Terminal for the owning session: the turn produces no audio and the
/// session closes rather than risk desynchronized turn ordering. No stage is
/// retried inside the pipeline.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    /// Which stage of transcribe → complete → synthesize failed
    pub stage: PipelineStage,

    /// The underlying collaborator failure
    #[source]
    pub source: CollaboratorError,
}

impl PipelineError {
    pub fn new(stage: PipelineStage, source: CollaboratorError) -> Self {
        Self { stage, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_names_the_stage() {
        let err = PipelineError::new(
            PipelineStage::Transcription,
            CollaboratorError::Malformed("no text field".to_string()),
        );
        let rendered = err.to_string();
        assert!(rendered.starts_with("transcription stage failed"));
        assert!(rendered.contains("no text field"));
    }

    #[test]
    fn test_stage_names_are_stable() {
        assert_eq!(PipelineStage::Transcription.as_str(), "transcription");
        assert_eq!(PipelineStage::Completion.as_str(), "completion");
        assert_eq!(PipelineStage::Synthesis.as_str(), "synthesis");
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::ValidationError("user_age must be positive".to_string());
        assert_eq!(err.to_string(), "Validation error: user_age must be positive");
    }
}
