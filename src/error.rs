//! Error taxonomy for the analysis engine.
//!
//! Creation-time errors (`InvalidInput`, `InvalidCron`, `ScrapingDisallowed`)
//! are surfaced synchronously to the caller. Execution-time errors are caught
//! by the runner, recorded as an error result, and never propagated.

use crate::fetch::FetchError;
use crate::extract::ExtractionError;
use crate::summarize::SummarizationError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("scraping disallowed: {0}")]
    ScrapingDisallowed(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Summarization(#[from] SummarizationError),

    #[error("storage operation failed: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("task not found: {0}")]
    NotFound(String),
}

impl EngineError {
    /// Short machine-readable code used in API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::InvalidCron { .. } => "invalid_cron",
            EngineError::ScrapingDisallowed(_) => "scraping_disallowed",
            EngineError::Fetch(_) => "fetch_error",
            EngineError::Extraction(_) => "extraction_error",
            EngineError::Summarization(_) => "summarization_error",
            EngineError::Persistence(_) => "persistence_failure",
            EngineError::NotFound(_) => "not_found",
        }
    }
}

/// Wrap any storage-layer failure. Keeps `?` ergonomic in the registry.
pub fn persistence(e: impl Into<anyhow::Error>) -> EngineError {
    EngineError::Persistence(e.into())
}
