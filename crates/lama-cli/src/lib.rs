//! # lama-cli
//!
//! LogLama command-line interface.
//!
//! Provides commands for:
//! - Listing, filtering and exporting stored records
//! - Per-level and per-component statistics
//! - Running the collector once or on an interval
//! - Emitting records from shell scripts
//!
//! # Architecture
//!
//! Every command works on a local SQLite store opened from the effective
//! [`LamaConfig`]. Reads go through [`QueryService`]; writes and collector
//! passes use the [`LogStore`] directly.
//!
//! ```text
//! ┌──────────┐   list/stats   ┌──────────────┐
//! │ lama-cli │───────────────►│ QueryService │──┐
//! └──────────┘                └──────────────┘  │  ┌──────────┐
//!      │      collect/emit/clear/export          ├─►│ LogStore │
//!      └─────────────────────────────────────────┘  └──────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use lama_logs::{LamaConfig, LogStore, QueryService};

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format};
pub use error::CliError;
pub use output::OutputFormat;

/// Opens the store named by `config`, creating the database if needed.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated.
pub fn open_store(config: &LamaConfig) -> Result<Arc<LogStore>, CliError> {
    let store = LogStore::open(&config.db_path, config.record_limits())?;
    tracing::debug!(db = %config.db_path.display(), "opened log store");
    Ok(Arc::new(store))
}

/// Builds the read service with the configured page sizes.
#[must_use]
pub fn query_service(store: Arc<LogStore>, config: &LamaConfig) -> QueryService {
    QueryService::new(store).with_page_sizes(config.default_page_size, config.max_page_size)
}
