//! Error types for the financial research agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Loop Errors
    // =============================

    #[error("Reasoning step failed: {0}")]
    ReasoningFailure(String),

    #[error("Reflection step failed: {0}")]
    ReflectionFailure(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    // =============================
    // Tool Errors
    // =============================

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Market data error: {0}")]
    MarketDataError(String),

    #[error("News feed error: {0}")]
    NewsError(String),

    #[error("Search error: {0}")]
    SearchError(String),

    // =============================
    // Setup
    // =============================

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
