//! # lama-logs
//!
//! Log storage, collection and query engine for LogLama.
//!
//! This crate provides:
//!
//! - [`LogRecord`] — Structured log records with call-site, process and context metadata
//! - [`LogLevel`] — Severity levels (Debug, Info, Warning, Error, Critical)
//! - [`Logger`] — Named emitter that merges ambient [`context`] into records
//! - [`LogStore`] — `SQLite`-backed durable store with filtering, aggregation and export
//! - [`JsonLinesWriter`] — Per-component JSON-lines log files with size-based rotation
//! - [`BufferedSink`] — In-memory buffer that drains on capacity or severity
//! - [`Collector`] — Incremental, resumable import of component sources
//! - [`QueryService`] — Paginated listing and statistics for the CLI and web surfaces
//! - [`LamaConfig`] — TOML-backed configuration
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use lama_logs::{LogFilter, LogLevel, LogStore, Logger, PageRequest, RecordLimits, Sort};
//!
//! let store = Arc::new(LogStore::open_in_memory(RecordLimits::default()).unwrap());
//! let log = Logger::new("app.auth", store.clone());
//! log.info("user signed in").unwrap();
//! log.error("token expired").unwrap();
//!
//! let filter = LogFilter::new().with_min_level(LogLevel::Warning);
//! let result = store.query(&filter, Sort::default(), PageRequest::default()).unwrap();
//! assert_eq!(result.total, 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod collector;
pub mod config;
pub mod context;
pub mod error;
pub mod logger;
pub mod query;
pub mod source;
pub mod store;
pub mod traits;
pub mod types;
pub mod writer;

// Re-export main types
pub use collector::{CollectReport, Collector, CollectorConfig, SourceReport, SourceState};
pub use config::LamaConfig;
pub use context::{capture_context, clear_context, current_context, scope_async, with_context};
pub use error::{LogError, Result};
pub use logger::Logger;
pub use query::{ListRequest, Page, QueryService, Stats};
pub use source::{ComponentSource, LineParser, Marker, SourceKind, rotated_path};
pub use store::{
    Aggregate, BatchOutcome, DeleteScope, ExportFormat, InsertOutcome, LogStore, QueryResult,
    SharedLogStore,
};
pub use traits::{BufferedSink, DEFAULT_BUFFER_CAPACITY, RecordSink, TeeSink};
pub use types::{
    ContextMap, LogFilter, LogId, LogLevel, LogRecord, PageRequest, RecordBuilder, RecordLimits,
    Sort, SortDirection, SortField, TimeRange,
};
pub use writer::{DEFAULT_BACKUP_COUNT, DEFAULT_MAX_LOG_SIZE, JsonLinesWriter, Rotation};
