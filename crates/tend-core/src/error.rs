//! Error types for Tend

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Pattern error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A sub-component is switched off; callers skip the stage
    #[error("Feature disabled: {0}")]
    FeatureDisabled(&'static str),

    #[error("External reasoning unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("External reasoning timed out after {0:?}")]
    Timeout(Duration),

    #[error("Template {template} failed: {reason}")]
    TemplateEvaluation { template: String, reason: String },

    #[error("Cache entry corrupt: {0}")]
    CacheCorruption(String),

    /// Malformed caller input. The only condition `generate` propagates.
    #[error("Invalid generation context: {0}")]
    InvalidContext(String),
}

impl Error {
    /// Whether the condition is absorbed into degraded-but-successful output
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::InvalidContext(_))
    }

    /// True for the external-reasoning deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
