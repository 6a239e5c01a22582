//! Error types for the log store, collector and query layers.

use thiserror::Error;

/// Errors that can occur in the logging system.
#[derive(Debug, Error)]
pub enum LogError {
    /// A record or filter request was malformed.
    ///
    /// Raised before any I/O happens and never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// The underlying SQLite store failed (I/O, corruption, capacity).
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A component log source could not be opened or read this pass.
    #[error("source unavailable: {source_name}: {reason}")]
    SourceUnavailable {
        /// Source key (kind and path).
        source_name: String,
        /// Why the source could not be read.
        reason: String,
    },

    /// A single line or row could not be turned into a record.
    #[error("parse error in {source_name} at offset {offset}: {reason}")]
    Parse {
        /// Source key (kind and path).
        source_name: String,
        /// Byte offset (files) or row id (tables) of the bad entry.
        offset: u64,
        /// What was wrong with the entry.
        reason: String,
    },

    /// A source scan ran past its wall-clock budget.
    #[error("scan of {source_name} exceeded its time budget")]
    Timeout {
        /// Source key (kind and path).
        source_name: String,
    },

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LogError {
    /// Shorthand for a [`LogError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Returns true for malformed-input errors.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if the failed operation may succeed on a later pass.
    ///
    /// The store itself never retries; this is a hint for the collector and
    /// for callers that wrap the store in their own retry policy.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::Timeout { .. } | Self::Io(_) | Self::Storage(_)
        )
    }
}

/// Result type alias for log operations.
pub type Result<T> = std::result::Result<T, LogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = LogError::validation("unknown level 'LOUD'");
        assert_eq!(err.to_string(), "validation error: unknown level 'LOUD'");

        let err = LogError::SourceUnavailable {
            source_name: "file:/var/log/auth.log".to_string(),
            reason: "not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "source unavailable: file:/var/log/auth.log: not found"
        );

        let err = LogError::Parse {
            source_name: "file:a.log".to_string(),
            offset: 42,
            reason: "missing level".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "parse error in file:a.log at offset 42: missing level"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LogError>();
    }

    #[test]
    fn validation_is_not_retryable() {
        let err = LogError::validation("bad");
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn source_errors_are_retryable() {
        let err = LogError::Timeout {
            source_name: "file:x.log".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_validation());
    }

    #[test]
    fn error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LogError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
        assert!(err.is_retryable());
    }

    #[test]
    fn error_storage_conversion() {
        let err: LogError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, LogError::Storage(_)));
    }
}
