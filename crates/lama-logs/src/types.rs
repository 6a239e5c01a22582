//! Core types for the log store.
//!
//! This module provides:
//! - [`LogLevel`] — The five severity levels with their numeric ranks
//! - [`LogRecord`] — Structured log record with source and runtime metadata
//! - [`RecordBuilder`] — Validating constructor for records
//! - [`LogFilter`] — Filter predicate shared by query, aggregate, delete and export
//! - [`Sort`] / [`PageRequest`] — Ordering and offset pagination
//! - [`LogId`] — Store-assigned surrogate key

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LogError, Result};

/// Default cap on message length, in characters.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 2000;

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Hard upper bound on rows per page.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Context keys that would shadow standard record attributes.
pub const RESERVED_CONTEXT_KEYS: &[&str] = &[
    "args",
    "asctime",
    "context",
    "created",
    "exc_info",
    "exc_text",
    "filename",
    "funcName",
    "id",
    "level",
    "level_no",
    "levelname",
    "levelno",
    "lineno",
    "logger_name",
    "message",
    "module",
    "msecs",
    "msg",
    "name",
    "pathname",
    "process",
    "processName",
    "relativeCreated",
    "stack_info",
    "thread",
    "threadName",
    "timestamp",
];

/// Ambient or per-record key/value metadata.
pub type ContextMap = BTreeMap<String, serde_json::Value>;

/// Unique identifier for a stored record.
///
/// `LogId(0)` marks a record that has not been persisted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogId(pub i64);

impl LogId {
    /// Placeholder id carried by records before insertion.
    pub const UNASSIGNED: Self = Self(0);

    /// Returns true if the store has assigned this id.
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Log severity levels, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum LogLevel {
    /// Debugging information
    Debug = 10,
    /// General information
    Info = 20,
    /// Warning conditions
    Warning = 30,
    /// Error conditions
    Error = 40,
    /// Failures the component cannot recover from
    Critical = 50,
}

impl LogLevel {
    /// All levels in ascending severity order.
    pub const ALL: [Self; 5] = [
        Self::Debug,
        Self::Info,
        Self::Warning,
        Self::Error,
        Self::Critical,
    ];

    /// Numeric severity rank (DEBUG=10 … CRITICAL=50).
    #[must_use]
    pub const fn rank(self) -> u32 {
        self as u32
    }

    /// Looks a level up by its exact numeric rank.
    #[must_use]
    pub const fn from_rank(rank: u32) -> Option<Self> {
        match rank {
            10 => Some(Self::Debug),
            20 => Some(Self::Info),
            30 => Some(Self::Warning),
            40 => Some(Self::Error),
            50 => Some(Self::Critical),
            _ => None,
        }
    }

    /// Returns true if this level is at least as severe as the given level.
    #[must_use]
    pub fn is_at_least(self, level: Self) -> bool {
        self >= level
    }

    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    /// Parses a level name (case-insensitive, `WARN`/`FATAL` aliases) or an
    /// exact numeric rank. Anything else is rejected.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(rank) = trimmed.parse::<u32>() {
            return Self::from_rank(rank)
                .ok_or_else(|| LogError::validation(format!("unknown level rank {rank}")));
        }
        match trimmed.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" | "FATAL" => Ok(Self::Critical),
            _ => Err(LogError::validation(format!("unknown level '{trimmed}'"))),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = LogError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Where a collected record was read from.
///
/// Used as the primary dedup key when re-scanning a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordOrigin {
    /// File path or source database path.
    pub path: String,
    /// Byte offset of the line (files) or row id (tables).
    pub offset: u64,
}

/// Limits applied when a record is built or stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLimits {
    /// Messages longer than this many characters are truncated.
    pub max_message_length: usize,
}

impl Default for RecordLimits {
    fn default() -> Self {
        Self {
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

impl RecordLimits {
    /// Creates limits with the given message cap.
    #[must_use]
    pub const fn with_max_message_length(max_message_length: usize) -> Self {
        Self { max_message_length }
    }
}

/// A structured log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Store-assigned identifier
    #[serde(default = "unassigned_id", skip_serializing_if = "is_unassigned")]
    pub id: LogId,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Severity level
    pub level: LogLevel,
    /// Dotted name of the emitting component (e.g. `app.auth`)
    pub logger_name: String,
    /// The log message
    pub message: String,
    /// Source file of the emitting call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Source line of the emitting call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    /// Function that emitted the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Module that emitted the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// OS process id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    /// Process name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    /// Thread identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<u64>,
    /// Thread name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
    /// Rendered exception / error chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_info: Option<String>,
    /// Additional structured context
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: ContextMap,
    /// Collector provenance, absent for records logged in-process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<RecordOrigin>,
}

const fn unassigned_id() -> LogId {
    LogId::UNASSIGNED
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_unassigned(id: &LogId) -> bool {
    !id.is_assigned()
}

impl LogRecord {
    /// Creates a new record builder.
    #[must_use]
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    /// Component name; alias for `logger_name`.
    #[must_use]
    pub fn component(&self) -> &str {
        &self.logger_name
    }

    /// Re-applies record validation and truncation.
    ///
    /// The store calls this on every insert so records assembled by hand get
    /// the same treatment as builder-made ones.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Validation`] if a context key is reserved or the
    /// logger name is empty.
    pub fn enforce(&mut self, limits: &RecordLimits) -> Result<()> {
        if self.logger_name.trim().is_empty() {
            return Err(LogError::validation("logger_name must not be empty"));
        }
        validate_context_keys(&self.context)?;
        truncate_chars(&mut self.message, limits.max_message_length);
        Ok(())
    }

    /// Checks if this record matches the given filter.
    ///
    /// Mirrors the SQL predicate the store builds from the same filter.
    #[must_use]
    pub fn matches(&self, filter: &LogFilter) -> bool {
        if let Some(level) = filter.level {
            let ok = match level {
                LevelFilter::Exact(l) => self.level == l,
                LevelFilter::AtLeast(l) => self.level.is_at_least(l),
            };
            if !ok {
                return false;
            }
        }

        if let Some(ref component) = filter.component {
            let ok = match component {
                ComponentFilter::Exact(name) => &self.logger_name == name,
                ComponentFilter::Prefix(prefix) => {
                    self.logger_name == *prefix
                        || self
                            .logger_name
                            .strip_prefix(prefix.as_str())
                            .is_some_and(|rest| rest.starts_with('.'))
                }
            };
            if !ok {
                return false;
            }
        }

        if let Some(ref search) = filter.search {
            let needle = search.to_lowercase();
            if !self.message.to_lowercase().contains(&needle) {
                return false;
            }
        }

        filter.time_range.contains(self.timestamp)
    }
}

/// Rejects context maps that use a reserved record attribute name.
///
/// # Errors
///
/// Returns [`LogError::Validation`] naming the first offending key.
pub fn validate_context_keys(context: &ContextMap) -> Result<()> {
    match context
        .keys()
        .find(|k| RESERVED_CONTEXT_KEYS.contains(&k.as_str()))
    {
        Some(key) => Err(LogError::validation(format!(
            "context key '{key}' collides with a reserved record field"
        ))),
        None => Ok(()),
    }
}

/// Truncates `s` to at most `max` characters, on a char boundary.
pub(crate) fn truncate_chars(s: &mut String, max: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
}

/// Renders a timestamp in the fixed-width form stored in the database.
///
/// Fixed width keeps lexical and chronological order identical.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses the timestamp shapes found in log sources and request strings.
///
/// Accepts RFC 3339 and naive `YYYY-MM-DD HH:MM:SS[.ffffff]` (a `T` separator
/// or a comma before the fraction also works). Naive values are taken as UTC.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let normalized = s.replacen(',', ".", 1);
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Converts fractional epoch seconds into a timestamp.
#[must_use]
pub fn timestamp_from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    #[allow(clippy::cast_possible_truncation)]
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Builder for constructing log records.
#[derive(Debug, Default, Clone)]
pub struct RecordBuilder {
    timestamp: Option<DateTime<Utc>>,
    level: Option<LogLevel>,
    logger_name: Option<String>,
    message: Option<String>,
    file_path: Option<String>,
    line_number: Option<u32>,
    function: Option<String>,
    module: Option<String>,
    process_id: Option<u32>,
    process_name: Option<String>,
    thread_id: Option<u64>,
    thread_name: Option<String>,
    exception_info: Option<String>,
    context: ContextMap,
    origin: Option<RecordOrigin>,
}

impl RecordBuilder {
    /// Sets the timestamp. Defaults to now.
    #[must_use]
    pub const fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the log level.
    #[must_use]
    pub const fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Sets the logger / component name.
    #[must_use]
    pub fn logger_name(mut self, name: impl Into<String>) -> Self {
        self.logger_name = Some(name.into());
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the source location.
    #[must_use]
    pub fn location(mut self, file_path: impl Into<String>, line_number: u32) -> Self {
        self.file_path = Some(file_path.into());
        self.line_number = Some(line_number);
        self
    }

    /// Sets the emitting function.
    #[must_use]
    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    /// Sets the emitting module.
    #[must_use]
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Sets process identity.
    #[must_use]
    pub fn process(mut self, process_id: u32, process_name: Option<String>) -> Self {
        self.process_id = Some(process_id);
        self.process_name = process_name;
        self
    }

    /// Sets thread identity.
    #[must_use]
    pub fn thread(mut self, thread_id: Option<u64>, thread_name: Option<String>) -> Self {
        self.thread_id = thread_id;
        self.thread_name = thread_name;
        self
    }

    /// Sets the rendered exception text.
    #[must_use]
    pub fn exception_info(mut self, info: impl Into<String>) -> Self {
        self.exception_info = Some(info.into());
        self
    }

    /// Adds one context entry.
    #[must_use]
    pub fn context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Merges a context map; later keys override earlier ones.
    #[must_use]
    pub fn extend_context(mut self, context: ContextMap) -> Self {
        self.context.extend(context);
        self
    }

    /// Sets collector provenance.
    #[must_use]
    pub fn origin(mut self, path: impl Into<String>, offset: u64) -> Self {
        self.origin = Some(RecordOrigin {
            path: path.into(),
            offset,
        });
        self
    }

    /// Builds the record, validating and truncating as needed.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Validation`] if the level, logger name or message
    /// is missing, or if a context key is reserved.
    pub fn build(self, limits: &RecordLimits) -> Result<LogRecord> {
        let level = self
            .level
            .ok_or_else(|| LogError::validation("missing required field: level"))?;
        let logger_name = self
            .logger_name
            .ok_or_else(|| LogError::validation("missing required field: logger_name"))?;
        let message = self
            .message
            .ok_or_else(|| LogError::validation("missing required field: message"))?;

        let mut record = LogRecord {
            id: LogId::UNASSIGNED,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            level,
            logger_name,
            message,
            file_path: self.file_path,
            line_number: self.line_number,
            function: self.function,
            module: self.module,
            process_id: self.process_id,
            process_name: self.process_name,
            thread_id: self.thread_id,
            thread_name: self.thread_name,
            exception_info: self.exception_info,
            context: self.context,
            origin: self.origin,
        };
        record.enforce(limits)?;
        Ok(record)
    }
}

/// Level predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelFilter {
    /// Only this level.
    Exact(LogLevel),
    /// This level or anything more severe.
    AtLeast(LogLevel),
}

/// Component predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentFilter {
    /// Exact logger name.
    Exact(String),
    /// The named component and its dotted children (`app` matches `app.auth`).
    Prefix(String),
}

/// Inclusive time range for filtering records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start of the range (inclusive)
    pub start: Option<DateTime<Utc>>,
    /// End of the range (inclusive)
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Creates a new time range with the given bounds.
    #[must_use]
    pub const fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Creates a time range from a start time onwards.
    #[must_use]
    pub const fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Checks if a timestamp falls within this range.
    #[must_use]
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if timestamp > end {
                return false;
            }
        }
        true
    }
}

/// Filter criteria for querying records.
///
/// An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Level predicate
    #[serde(default)]
    pub level: Option<LevelFilter>,
    /// Component predicate
    #[serde(default)]
    pub component: Option<ComponentFilter>,
    /// Case-insensitive substring search in `message`
    #[serde(default)]
    pub search: Option<String>,
    /// Timestamp range
    #[serde(default)]
    pub time_range: TimeRange,
}

impl LogFilter {
    /// Creates a new empty filter that matches all records.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches exactly this level.
    #[must_use]
    pub const fn with_level(mut self, level: LogLevel) -> Self {
        self.level = Some(LevelFilter::Exact(level));
        self
    }

    /// Matches this level and anything more severe.
    #[must_use]
    pub const fn with_min_level(mut self, level: LogLevel) -> Self {
        self.level = Some(LevelFilter::AtLeast(level));
        self
    }

    /// Matches exactly this component.
    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(ComponentFilter::Exact(component.into()));
        self
    }

    /// Matches this component and its dotted children.
    #[must_use]
    pub fn with_component_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.component = Some(ComponentFilter::Prefix(prefix.into()));
        self
    }

    /// Adds a message search.
    #[must_use]
    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    /// Adds a time range filter.
    #[must_use]
    pub const fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    /// Checks the filter shape before it reaches the store.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Validation`] if the time range is inverted or a
    /// component predicate is blank.
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.time_range.start, self.time_range.end) {
            if end < start {
                return Err(LogError::validation(format!(
                    "end date {end} is before start date {start}"
                )));
            }
        }
        if let Some(ComponentFilter::Exact(c) | ComponentFilter::Prefix(c)) = &self.component {
            if c.trim().is_empty() {
                return Err(LogError::validation("component filter must not be blank"));
            }
        }
        Ok(())
    }
}

/// Sortable columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Insertion order
    Id,
    /// Event time
    #[default]
    Timestamp,
    /// Severity rank
    Level,
    /// Logger / component name
    Component,
    /// Message text
    Message,
}

impl SortField {
    /// Column this field sorts on.
    pub(crate) const fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Timestamp => "timestamp",
            Self::Level => "level_no",
            Self::Component => "logger_name",
            Self::Message => "message",
        }
    }
}

impl FromStr for SortField {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "timestamp" | "time" | "created" => Ok(Self::Timestamp),
            "level" | "level_no" => Ok(Self::Level),
            "component" | "logger_name" | "logger" => Ok(Self::Component),
            "message" => Ok(Self::Message),
            other => Err(LogError::validation(format!("cannot sort by '{other}'"))),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending
    Asc,
    /// Descending
    #[default]
    Desc,
}

impl SortDirection {
    pub(crate) const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" => Ok(Self::Desc),
            other => Err(LogError::validation(format!(
                "sort direction must be asc or desc, got '{other}'"
            ))),
        }
    }
}

/// Result ordering. Defaults to newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    /// Primary sort column
    pub field: SortField,
    /// Direction for both the primary column and the id tie-break
    pub direction: SortDirection,
}

impl Sort {
    /// Creates a sort.
    #[must_use]
    pub const fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// `ORDER BY` clause; `id` always breaks ties so the order is total.
    pub(crate) fn order_by(self) -> String {
        let dir = self.direction.keyword();
        match self.field {
            SortField::Id => format!("ORDER BY id {dir}"),
            field => format!("ORDER BY {} {dir}, id {dir}", field.column()),
        }
    }
}

/// One-based offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number, starting at 1
    pub page: u32,
    /// Rows per page, at most [`MAX_PAGE_SIZE`]
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Creates a page request, clamping out-of-range values.
    #[must_use]
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Number of rows to skip.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.page_size as u64
    }
}
