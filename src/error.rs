//! Error types for the Gatelimit service.

use thiserror::Error;

/// Main error type for Gatelimit operations.
#[derive(Error, Debug)]
pub enum GatelimitError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Gatelimit operations.
pub type Result<T> = std::result::Result<T, GatelimitError>;
