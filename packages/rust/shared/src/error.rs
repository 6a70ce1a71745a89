//! Error types for tenderwatch.
//!
//! Library crates use [`TenderError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all tenderwatch operations.
#[derive(Debug, thiserror::Error)]
pub enum TenderError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to the tender API, the model, or the webhook.
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Primary model enrichment failed (transport, missing tool call, schema mismatch).
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// The notification sink rejected a message.
    #[error("notification error: {0}")]
    Notification(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TenderError>;

impl TenderError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = TenderError::config("lookback_days is required");
        assert_eq!(err.to_string(), "config error: lookback_days is required");

        let err = TenderError::Notification("webhook returned 404 Not Found: no_service".into());
        assert_eq!(
            err.to_string(),
            "notification error: webhook returned 404 Not Found: no_service"
        );

        let err = TenderError::Enrichment("no tool call in response".into());
        assert_eq!(err.to_string(), "enrichment error: no tool call in response");
    }

    #[test]
    fn io_error_names_the_path() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = TenderError::io("/tmp/batch.json", source);
        assert!(matches!(err, TenderError::Io { .. }));
        assert_eq!(err.to_string(), "I/O error at \"/tmp/batch.json\": no such file");
    }
}
