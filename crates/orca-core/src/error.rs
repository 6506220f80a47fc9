//! Error types for orca-core

use thiserror::Error;

/// Main error type for orca-core
#[derive(Error, Debug)]
pub enum Error {
    /// The model endpoint rejected or failed the request
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    /// A capability was invoked with arguments it cannot accept
    #[error("Invalid arguments - {0}")]
    InvalidArguments(String),

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for argument errors raised while decoding tool input
    pub fn invalid_arguments(detail: impl std::fmt::Display) -> Self {
        Self::InvalidArguments(detail.to_string())
    }
}

/// Result type alias for orca-core
pub type Result<T> = std::result::Result<T, Error>;
