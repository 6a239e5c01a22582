//! Named record emitter.
//!
//! A [`Logger`] turns `info("...")`-style calls into [`LogRecord`]s: it fills
//! in the call site, process and thread identity, merges the ambient
//! [`context`](crate::context) under any explicit per-call context, and hands
//! the result to a [`RecordSink`]. Loggers are cheap to clone and hold no
//! global state; callers construct and pass them explicitly.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lama_logs::{LogStore, Logger, RecordLimits};
//!
//! let store = Arc::new(LogStore::open("logs/loglama.db", RecordLimits::default()).unwrap());
//! let log = Logger::new("app.auth", store);
//! log.info("user signed in").unwrap();
//! ```

use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::current_context;
use crate::error::Result;
use crate::traits::RecordSink;
use crate::types::{ContextMap, LogId, LogLevel, LogRecord, RecordLimits};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

fn process_name() -> Option<String> {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
}

/// Renders an error and its `source()` chain, one cause per line.
#[must_use]
pub fn render_error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        out.push_str("\nCaused by: ");
        out.push_str(&inner.to_string());
        cause = inner.source();
    }
    out
}

/// Emits records for one component.
#[derive(Clone)]
pub struct Logger {
    name: String,
    sink: Arc<dyn RecordSink>,
    min_level: LogLevel,
    limits: RecordLimits,
    process_name: Option<String>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("min_level", &self.min_level)
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Creates a logger named `name` writing to `sink`.
    ///
    /// The minimum level defaults to `DEBUG` (everything is emitted).
    pub fn new(name: impl Into<String>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            name: name.into(),
            sink,
            min_level: LogLevel::Debug,
            limits: RecordLimits::default(),
            process_name: process_name(),
        }
    }

    /// Drops calls below `level`.
    #[must_use]
    pub const fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Sets the message limits applied to built records.
    #[must_use]
    pub const fn with_limits(mut self, limits: RecordLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Overrides the reported process name.
    #[must_use]
    pub fn with_process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = Some(name.into());
        self
    }

    /// Returns a logger for a dotted sub-component sharing this sink.
    #[must_use]
    pub fn child(&self, suffix: &str) -> Self {
        Self {
            name: format!("{}.{suffix}", self.name),
            ..self.clone()
        }
    }

    /// Component name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if a call at `level` would be emitted.
    #[must_use]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level.is_at_least(self.min_level)
    }

    /// Emits a record at `level`.
    ///
    /// Returns `Ok(None)` when the level is filtered out or the sink assigns
    /// ids later.
    ///
    /// # Errors
    ///
    /// Returns an error if the ambient context holds a reserved key or the
    /// sink fails.
    #[track_caller]
    pub fn log(&self, level: LogLevel, message: impl Into<String>) -> Result<Option<LogId>> {
        self.emit(level, message.into(), ContextMap::new(), None, Location::caller())
    }

    /// Emits a record with extra context; explicit keys override ambient ones.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `context` uses a reserved key (nothing
    /// is emitted), or the sink's error.
    #[track_caller]
    pub fn log_with(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        context: ContextMap,
    ) -> Result<Option<LogId>> {
        self.emit(level, message.into(), context, None, Location::caller())
    }

    /// Emits at `DEBUG`.
    ///
    /// # Errors
    ///
    /// See [`Logger::log`].
    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) -> Result<Option<LogId>> {
        self.emit(LogLevel::Debug, message.into(), ContextMap::new(), None, Location::caller())
    }

    /// Emits at `INFO`.
    ///
    /// # Errors
    ///
    /// See [`Logger::log`].
    #[track_caller]
    pub fn info(&self, message: impl Into<String>) -> Result<Option<LogId>> {
        self.emit(LogLevel::Info, message.into(), ContextMap::new(), None, Location::caller())
    }

    /// Emits at `WARNING`.
    ///
    /// # Errors
    ///
    /// See [`Logger::log`].
    #[track_caller]
    pub fn warning(&self, message: impl Into<String>) -> Result<Option<LogId>> {
        self.emit(LogLevel::Warning, message.into(), ContextMap::new(), None, Location::caller())
    }

    /// Emits at `ERROR`.
    ///
    /// # Errors
    ///
    /// See [`Logger::log`].
    #[track_caller]
    pub fn error(&self, message: impl Into<String>) -> Result<Option<LogId>> {
        self.emit(LogLevel::Error, message.into(), ContextMap::new(), None, Location::caller())
    }

    /// Emits at `CRITICAL`.
    ///
    /// # Errors
    ///
    /// See [`Logger::log`].
    #[track_caller]
    pub fn critical(&self, message: impl Into<String>) -> Result<Option<LogId>> {
        self.emit(LogLevel::Critical, message.into(), ContextMap::new(), None, Location::caller())
    }

    /// Emits at `ERROR` with `exception_info` rendered from `err` and its
    /// causes.
    ///
    /// # Errors
    ///
    /// See [`Logger::log`].
    #[track_caller]
    pub fn exception(
        &self,
        message: impl Into<String>,
        err: &(dyn std::error::Error + 'static),
    ) -> Result<Option<LogId>> {
        self.emit(
            LogLevel::Error,
            message.into(),
            ContextMap::new(),
            Some(render_error_chain(err)),
            Location::caller(),
        )
    }

    fn emit(
        &self,
        level: LogLevel,
        message: String,
        context: ContextMap,
        exception_info: Option<String>,
        location: &'static Location<'static>,
    ) -> Result<Option<LogId>> {
        if !self.is_enabled(level) {
            return Ok(None);
        }

        let thread = std::thread::current();
        let mut builder = LogRecord::builder()
            .level(level)
            .logger_name(self.name.as_str())
            .message(message)
            .location(location.file(), location.line())
            .process(std::process::id(), self.process_name.clone())
            .thread(
                Some(THREAD_ID.with(|id| *id)),
                thread.name().map(str::to_string),
            )
            .extend_context(current_context())
            .extend_context(context);
        if let Some(info) = exception_info {
            builder = builder.exception_info(info);
        }

        let record = builder.build(&self.limits)?;
        self.sink.emit(record)
    }
}
