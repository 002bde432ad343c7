//! Error types for nanogrip
//!
//! One crate-wide error enum built on `thiserror`. Subsystems that must
//! always hand text back to the LLM (the tool registry) format these into
//! strings instead of propagating them.

use thiserror::Error;

/// The primary error type for nanogrip operations.
#[derive(Error, Debug)]
pub enum NanoError {
    /// Configuration errors (invalid config, missing required fields). Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM provider errors (HTTP failures, malformed responses).
    #[error("Provider error: {0}")]
    Provider(String),

    /// Channel adapter errors (connection failures, send failures).
    #[error("Channel error: {0}")]
    Channel(String),

    /// Tool execution errors.
    #[error("Tool error: {0}")]
    Tool(String),

    /// Session management errors (persistence failures, invalid state).
    #[error("Session error: {0}")]
    Session(String),

    /// Inbound or outbound queue is at capacity.
    #[error("Bus error: queue full")]
    BusFull,

    /// The bus has been closed; no further publishes or consumes.
    #[error("Bus error: bus closed")]
    BusClosed,

    /// A blocking operation was cancelled via its cancellation token.
    #[error("Cancelled")]
    Cancelled,

    /// Resource not found (sessions, tools, jobs).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Standard I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parse errors.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for nanogrip operations.
pub type Result<T> = std::result::Result<T, NanoError>;
