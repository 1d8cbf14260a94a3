//! Error types for Factify.

use std::time::Duration;
use thiserror::Error;

/// Library-level error type for Factify operations.
#[derive(Error, Debug)]
pub enum FactifyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transcript fetch failed: {0}")]
    TranscriptFetch(String),

    #[error("Empty transcript: {0}")]
    EmptyTranscript(String),

    #[error("Invalid LLM response: {0}")]
    Parse(String),

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Credibility assessment failed: {0}")]
    Credibility(String),

    #[error("Topic clustering failed: {0}")]
    TopicClustering(String),

    #[error("Pipeline stage '{stage}' failed for {video_id}: {source}")]
    Pipeline {
        stage: &'static str,
        video_id: String,
        #[source]
        source: Box<FactifyError>,
    },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl FactifyError {
    /// Wrap a stage error with the pipeline stage and video it belongs to.
    pub fn in_stage(stage: &'static str, video_id: &str, source: FactifyError) -> Self {
        FactifyError::Pipeline {
            stage,
            video_id: video_id.to_string(),
            source: Box::new(source),
        }
    }
}

/// Errors surfaced by a chat model.
///
/// Only the rate-limit variant feeds the throttle's failure bookkeeping.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("request failed: {0}")]
    Request(String),

    #[error("empty response from model")]
    EmptyResponse,
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }
}

/// Result type alias for Factify operations.
pub type Result<T> = std::result::Result<T, FactifyError>;
