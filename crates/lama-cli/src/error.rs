//! CLI error types.

use lama_logs::LogError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// The log engine failed.
    #[error(transparent)]
    Log(#[from] LogError),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
