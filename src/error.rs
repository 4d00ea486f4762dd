use crate::client::providers::SourceError;
use thiserror::Error;

/// Crate-level error type
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (permanent failures)
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Environment configuration error: {0}")]
    Env(#[from] envy::Error),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    // Client errors (permanent - caller must fix input)
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    // Every requested source came back empty
    #[error("No papers found for topic '{topic}'")]
    NoPapersFound { topic: String },

    // Strategy-level failure surfaced outside a fallback chain
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// Error categorization for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Permanent errors - should not retry
    Permanent,
    /// Transient errors - safe to retry
    Transient,
    /// Rate limited - give up on this endpoint for now
    RateLimited,
    /// A fallback tier that cannot run with the current configuration
    Unavailable,
}

impl Error {
    /// Categorize error for retry logic
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Source(source) => source.category(),
            Self::Io(_) => ErrorCategory::Transient,
            Self::Config(_)
            | Self::Env(_)
            | Self::Serde(_)
            | Self::InvalidInput { .. }
            | Self::NoPapersFound { .. } => ErrorCategory::Permanent,
        }
    }

    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

pub type Result<T> = std::result::Result<T, Error>;
