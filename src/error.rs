// src/error.rs

//! Unified error handling for the jobwatch pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Regex compilation failed
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Pattern compilation failed
    #[error("Invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A job board could not be reached or answered garbage.
    #[error("Source '{source_id}' unavailable: {message}")]
    SourceUnavailable { source_id: String, message: String },

    /// The enrichment collaborator failed or timed out.
    #[error("Enrichment degraded: {0}")]
    EnrichmentDegraded(String),

    /// A record could not be turned into a scoreable posting.
    #[error("Malformed record from '{source_id}': {message}")]
    MalformedRecord { source_id: String, message: String },

    /// Durable dedup state cannot be read or written. Fatal for a run.
    #[error("State store unavailable: {0}")]
    StateStoreUnavailable(String),

    /// A message could not be delivered.
    #[error("Delivery failed after {attempts} attempt(s): {message}")]
    DeliveryFailed { attempts: u32, message: String },

    /// Another run holds the lock.
    #[error("Run lock held by {holder} since {since}{}", stale_suffix(.stale))]
    RunLocked {
        holder: String,
        since: String,
        stale: bool,
    },

    /// Every configured source failed.
    #[error("All {count} source(s) failed")]
    AllSourcesFailed { count: usize },
}

fn stale_suffix(stale: &bool) -> &'static str {
    if *stale { " (stale)" } else { "" }
}

impl AppError {
    /// Create a pattern compilation error.
    pub fn pattern(pattern: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a source failure for the given source.
    pub fn source_unavailable(source_id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.into(),
            message: message.to_string(),
        }
    }

    /// Create a malformed-record error.
    pub fn malformed(source_id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::MalformedRecord {
            source_id: source_id.into(),
            message: message.to_string(),
        }
    }

    /// Create a state store error.
    pub fn store(message: impl fmt::Display) -> Self {
        Self::StateStoreUnavailable(message.to_string())
    }

    /// Create a delivery error.
    pub fn delivery(attempts: u32, message: impl fmt::Display) -> Self {
        Self::DeliveryFailed {
            attempts,
            message: message.to_string(),
        }
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StateStoreUnavailable(_) | Self::AllSourcesFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AppError::store("disk full").is_fatal());
        assert!(AppError::AllSourcesFailed { count: 3 }.is_fatal());
        assert!(!AppError::source_unavailable("gupy", "timeout").is_fatal());
        assert!(!AppError::delivery(3, "429").is_fatal());
        assert!(!AppError::EnrichmentDegraded("timeout".into()).is_fatal());
    }

    #[test]
    fn test_run_locked_display() {
        let err = AppError::RunLocked {
            holder: "run-1".into(),
            since: "2026-01-01T00:00:00Z".into(),
            stale: true,
        };
        assert!(err.to_string().ends_with("(stale)"));
    }
}
