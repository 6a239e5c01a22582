//! Component log sources and the readers that turn them into records.
//!
//! This module provides:
//! - [`ComponentSource`] — A named file or table the collector imports from
//! - [`Marker`] — How far into a source the collector has already imported
//! - [`SourceReader`] — Per-kind reader, with [`JsonLinesReader`] and
//!   [`SqliteTableReader`] implementations
//! - [`LineParser`] — JSON line to [`LogRecord`] extraction
//!
//! Readers never touch the store. They return a batch of candidate records
//! plus the marker to persist once the batch has been imported.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::error::{LogError, Result};
use crate::types::{
    ContextMap, LogId, LogLevel, LogRecord, RESERVED_CONTEXT_KEYS, RecordOrigin,
    parse_timestamp, timestamp_from_epoch, validate_context_keys,
};

/// Default cap on entries read from one source in one pass.
pub const DEFAULT_MAX_ENTRIES_PER_SCAN: usize = 10_000;

const DEADLINE_CHECK_EVERY: usize = 128;

/// At most this much of a file's first line goes into its fingerprint.
const FINGERPRINT_MAX_BYTES: u64 = 4096;

/// Rotated copies (`app.log.1` .. `app.log.N`) searched for a replaced file.
const ROTATION_SEARCH_DEPTH: u32 = 16;

/// Bookmark of how far a source has been imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    /// Byte offset just past the last consumed line of a file.
    ///
    /// `generation` counts how often the file was seen to be replaced; it
    /// keeps origins of rewritten content distinct from the lines they
    /// replaced. `fingerprint` identifies the file the offset belongs to.
    File {
        /// Byte offset of the next unread line
        offset: u64,
        /// Replacement count
        generation: u32,
        /// Hash of the file's first line, once it has one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fingerprint: Option<u64>,
    },
    /// Id of the last imported row of a table source.
    Row(i64),
}

impl Marker {
    /// Splits the marker into its stored columns.
    pub(crate) fn to_parts(self) -> (&'static str, i64, i64, Option<i64>) {
        match self {
            Self::File {
                offset,
                generation,
                fingerprint,
            } => (
                "file",
                i64::try_from(offset).unwrap_or(i64::MAX),
                i64::from(generation),
                fingerprint.map(|fp| fp as i64),
            ),
            Self::Row(id) => ("row", id, 0, None),
        }
    }

    pub(crate) fn from_parts(
        kind: &str,
        position: i64,
        generation: i64,
        fingerprint: Option<i64>,
    ) -> Result<Self> {
        match kind {
            "file" => Ok(Self::File {
                offset: u64::try_from(position).unwrap_or_default(),
                generation: u32::try_from(generation).unwrap_or_default(),
                fingerprint: fingerprint.map(|fp| fp as u64),
            }),
            "row" => Ok(Self::Row(position)),
            other => Err(LogError::Config(format!("unknown marker kind '{other}'"))),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File {
                offset,
                generation: 0,
                ..
            } => write!(f, "offset {offset}"),
            Self::File {
                offset, generation, ..
            } => write!(f, "offset {offset} (gen {generation})"),
            Self::Row(id) => write!(f, "row {id}"),
        }
    }
}

/// What kind of origin a source is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceKind {
    /// A text file with one JSON record per line.
    JsonLinesFile,
    /// A table in another SQLite database with a log-shaped schema.
    SqliteTable {
        /// Table name
        table: String,
    },
}

/// One file- or table-based log origin belonging to a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentSource {
    /// Component the records are attributed to when they carry no name
    pub component: String,
    /// File path, or database path for table sources
    pub path: PathBuf,
    /// Source kind
    pub kind: SourceKind,
}

impl ComponentSource {
    /// A JSON-lines file source.
    #[must_use]
    pub fn json_lines(component: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            component: component.into(),
            path: path.into(),
            kind: SourceKind::JsonLinesFile,
        }
    }

    /// A table source in another SQLite database.
    #[must_use]
    pub fn sqlite_table(
        component: impl Into<String>,
        path: impl Into<PathBuf>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            path: path.into(),
            kind: SourceKind::SqliteTable {
                table: table.into(),
            },
        }
    }

    /// Stable key used for markers, locks and reports.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.kind {
            SourceKind::JsonLinesFile => format!("file:{}", self.path.display()),
            SourceKind::SqliteTable { table } => {
                format!("sqlite:{}#{table}", self.path.display())
            }
        }
    }

    /// Checks the source before it is registered.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Validation`] for a blank component or an unsafe
    /// table name.
    pub fn validate(&self) -> Result<()> {
        if self.component.trim().is_empty() {
            return Err(LogError::validation("source component must not be blank"));
        }
        if let SourceKind::SqliteTable { table } = &self.kind {
            let ok = !table.is_empty()
                && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !ok {
                return Err(LogError::validation(format!(
                    "table name '{table}' must be alphanumeric or underscore"
                )));
            }
        }
        Ok(())
    }

    fn unavailable(&self, reason: impl fmt::Display) -> LogError {
        LogError::SourceUnavailable {
            source_name: self.key(),
            reason: reason.to_string(),
        }
    }
}

/// Limits on a single read.
#[derive(Debug, Clone, Copy)]
pub struct ScanBudget {
    /// Give up with [`LogError::Timeout`] once this instant passes
    pub deadline: Option<Instant>,
    /// Stop after this many entries; the rest is read next pass
    pub max_entries: usize,
}

impl Default for ScanBudget {
    fn default() -> Self {
        Self {
            deadline: None,
            max_entries: DEFAULT_MAX_ENTRIES_PER_SCAN,
        }
    }
}

impl ScanBudget {
    /// Budget that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            ..Self::default()
        }
    }

    fn check(&self, source: &ComponentSource, seen: usize) -> Result<()> {
        if seen % DEADLINE_CHECK_EVERY == 0 {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    return Err(LogError::Timeout {
                        source_name: source.key(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Candidate records from one read.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    /// Parsed records, in source order
    pub records: Vec<LogRecord>,
    /// Entries that could not be parsed and were skipped
    pub parse_errors: u64,
    /// Marker to persist after the records are imported
    pub next_marker: Marker,
    /// The file had shrunk and was re-read from the start
    pub rewound: bool,
    /// The entry cap was hit; more content is waiting
    pub more: bool,
}

/// Reads new entries from one kind of source.
pub trait SourceReader: Send + Sync {
    /// Reads entries after `marker` (from the start when `None`).
    ///
    /// # Errors
    ///
    /// Returns [`LogError::SourceUnavailable`] if the source cannot be
    /// opened or read and [`LogError::Timeout`] if the budget runs out.
    /// Bad individual entries are counted, never returned as errors.
    fn read(
        &self,
        source: &ComponentSource,
        marker: Option<Marker>,
        budget: &ScanBudget,
    ) -> Result<ScanOutcome>;
}

/// Returns the reader for a source kind.
#[must_use]
pub fn reader_for(kind: &SourceKind) -> &'static dyn SourceReader {
    static JSON_LINES: JsonLinesReader = JsonLinesReader::new();
    static SQLITE_TABLE: SqliteTableReader = SqliteTableReader;
    match kind {
        SourceKind::JsonLinesFile => &JSON_LINES,
        SourceKind::SqliteTable { .. } => &SQLITE_TABLE,
    }
}

fn wrong_marker(source: &ComponentSource, marker: Marker) -> LogError {
    LogError::Config(format!(
        "stored marker '{marker}' does not fit source {}",
        source.key()
    ))
}

fn log_parse_error(source: &ComponentSource, offset: u64, reason: String) {
    let err = LogError::Parse {
        source_name: source.key(),
        offset,
        reason,
    };
    tracing::warn!(source = %source.key(), offset, error = %err, "skipping unparseable entry");
}

// ========== JSON lines ==========

const TIMESTAMP_KEYS: &[&str] = &["timestamp", "@timestamp", "time", "asctime", "created"];
const LEVEL_KEYS: &[&str] = &[
    "level",
    "levelname",
    "severity",
    "level_number",
    "level_no",
    "levelno",
];
const LOGGER_KEYS: &[&str] = &["logger_name", "name", "logger"];
const MESSAGE_KEYS: &[&str] = &["message", "msg"];
const FILE_KEYS: &[&str] = &["file_path", "pathname"];
const LINE_KEYS: &[&str] = &["line_number", "lineno"];
const FUNCTION_KEYS: &[&str] = &["function", "funcName"];
const PROCESS_KEYS: &[&str] = &["process_id", "process"];
const PROCESS_NAME_KEYS: &[&str] = &["process_name", "processName"];
const THREAD_KEYS: &[&str] = &["thread_id", "thread"];
const THREAD_NAME_KEYS: &[&str] = &["thread_name", "threadName"];
const EXCEPTION_KEYS: &[&str] = &["exception_info", "exc_info", "exc_text"];

/// Keys the parser consumes or deliberately drops; everything else becomes
/// context.
const CONSUMED_KEYS: &[&[&str]] = &[
    TIMESTAMP_KEYS,
    LEVEL_KEYS,
    LOGGER_KEYS,
    MESSAGE_KEYS,
    FILE_KEYS,
    LINE_KEYS,
    FUNCTION_KEYS,
    PROCESS_KEYS,
    PROCESS_NAME_KEYS,
    THREAD_KEYS,
    THREAD_NAME_KEYS,
    EXCEPTION_KEYS,
    &["module", "context", "id"],
];

type JsonObject = Map<String, serde_json::Value>;

fn first<'a>(obj: &'a JsonObject, keys: &[&str]) -> Option<&'a serde_json::Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn str_field(obj: &JsonObject, keys: &[&str]) -> Option<String> {
    first(obj, keys).and_then(|v| v.as_str()).map(str::to_string)
}

fn u64_field(obj: &JsonObject, keys: &[&str]) -> Option<u64> {
    first(obj, keys).and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Parser for JSON log lines.
///
/// Understands the field names LogLama writers produce as well as the
/// conventional record attribute names (`levelname`, `msg`, `asctime`, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct LineParser;

impl LineParser {
    /// Creates a new line parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Parses one line into a record attributed to `component` when the
    /// line names no logger.
    ///
    /// # Errors
    ///
    /// Returns the reason the line was rejected: not a JSON object, missing
    /// or unknown level, missing or unreadable timestamp, missing message,
    /// or a reserved key inside `context`.
    pub fn parse(&self, line: &str, component: &str) -> std::result::Result<LogRecord, String> {
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).map_err(|e| format!("invalid JSON: {e}"))?;
        let serde_json::Value::Object(obj) = value else {
            return Err("line is not a JSON object".to_string());
        };

        let level = match first(&obj, LEVEL_KEYS) {
            Some(serde_json::Value::String(s)) => s.parse::<LogLevel>().map_err(|e| e.to_string())?,
            Some(serde_json::Value::Number(n)) => n
                .as_u64()
                .and_then(|r| u32::try_from(r).ok())
                .and_then(LogLevel::from_rank)
                .ok_or_else(|| format!("unknown level rank {n}"))?,
            _ => return Err("missing level".to_string()),
        };

        let timestamp = match first(&obj, TIMESTAMP_KEYS) {
            Some(serde_json::Value::String(s)) => {
                parse_timestamp(s).ok_or_else(|| format!("unreadable timestamp '{s}'"))?
            }
            Some(serde_json::Value::Number(n)) => n
                .as_f64()
                .and_then(timestamp_from_epoch)
                .ok_or_else(|| format!("unreadable timestamp {n}"))?,
            _ => return Err("missing timestamp".to_string()),
        };

        let message = match first(&obj, MESSAGE_KEYS) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => return Err("missing message".to_string()),
        };

        let logger_name = str_field(&obj, LOGGER_KEYS)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| component.to_string());

        let context = Self::context(&obj)?;

        Ok(LogRecord {
            id: LogId::UNASSIGNED,
            timestamp,
            level,
            logger_name,
            message,
            file_path: str_field(&obj, FILE_KEYS),
            line_number: u64_field(&obj, LINE_KEYS).and_then(|n| u32::try_from(n).ok()),
            function: str_field(&obj, FUNCTION_KEYS),
            module: str_field(&obj, &["module"]),
            process_id: u64_field(&obj, PROCESS_KEYS).and_then(|n| u32::try_from(n).ok()),
            process_name: str_field(&obj, PROCESS_NAME_KEYS),
            thread_id: u64_field(&obj, THREAD_KEYS),
            thread_name: str_field(&obj, THREAD_NAME_KEYS),
            exception_info: str_field(&obj, EXCEPTION_KEYS),
            context,
            origin: None,
        })
    }

    /// Collects top-level extras plus the nested `context` object.
    fn context(obj: &JsonObject) -> std::result::Result<ContextMap, String> {
        let mut context: ContextMap = obj
            .iter()
            .filter(|(k, _)| {
                !CONSUMED_KEYS.iter().any(|keys| keys.contains(&k.as_str()))
                    && !RESERVED_CONTEXT_KEYS.contains(&k.as_str())
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        match obj.get("context") {
            Some(serde_json::Value::Object(nested)) => {
                let nested: ContextMap =
                    nested.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                validate_context_keys(&nested).map_err(|e| e.to_string())?;
                context.extend(nested);
            }
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                let nested: ContextMap = serde_json::from_str(s)
                    .map_err(|e| format!("context is not a JSON object: {e}"))?;
                validate_context_keys(&nested).map_err(|e| e.to_string())?;
                context.extend(nested);
            }
            _ => {}
        }
        Ok(context)
    }
}

/// Path of the `n`th rotated copy of `path` (`app.log` becomes `app.log.1`).
#[must_use]
pub fn rotated_path(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Hashes the first line of `file`, or `None` while it has no complete one.
fn file_fingerprint(file: &mut File) -> io::Result<Option<u64>> {
    file.seek(SeekFrom::Start(0))?;
    let mut head = Vec::new();
    BufReader::new((&mut *file).take(FINGERPRINT_MAX_BYTES)).read_until(b'\n', &mut head)?;
    if head.last() != Some(&b'\n') && (head.len() as u64) < FINGERPRINT_MAX_BYTES {
        return Ok(None);
    }
    let hash = blake3::hash(&head);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    Ok(Some(u64::from_le_bytes(bytes)))
}

/// Lines read from one file.
#[derive(Debug, Default)]
struct LineBatch {
    records: Vec<LogRecord>,
    parse_errors: u64,
    seen: usize,
    end: u64,
    more: bool,
}

impl LineBatch {
    fn absorb(&mut self, other: Self) {
        self.records.extend(other.records);
        self.parse_errors += other.parse_errors;
        self.seen += other.seen;
    }
}

/// Reads appended lines of a JSON-lines file.
///
/// A trailing line without a newline is left for the next pass. The marker
/// remembers a fingerprint of the file's first line; when the file at the
/// path is shorter than the stored offset or starts differently, it has been
/// rotated or truncated. The reader then looks for the old file among the
/// rotated copies (`path.1`, `path.2`, ...), finishes its tail and any newer
/// copies, and reads the current file from the start under a new generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesReader {
    parser: LineParser,
}

impl JsonLinesReader {
    /// Creates a reader with the default parser.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            parser: LineParser::new(),
        }
    }

    fn origin_path(path: &Path, generation: u32) -> String {
        if generation == 0 {
            path.display().to_string()
        } else {
            format!("{}#{generation}", path.display())
        }
    }

    /// Rotated copies from the one whose first line hashes to `fingerprint`
    /// down to `path.1`, oldest first. Empty when no copy matches.
    fn rotated_chain(path: &Path, fingerprint: u64) -> Vec<PathBuf> {
        let mut chain = Vec::new();
        for n in 1..=ROTATION_SEARCH_DEPTH {
            let candidate = rotated_path(path, n);
            let Ok(mut file) = File::open(&candidate) else {
                break;
            };
            let matched = file_fingerprint(&mut file).ok().flatten() == Some(fingerprint);
            chain.push(candidate);
            if matched {
                chain.reverse();
                return chain;
            }
        }
        Vec::new()
    }

    fn read_lines(
        &self,
        source: &ComponentSource,
        file: &mut File,
        start: u64,
        origin_path: &str,
        max_entries: usize,
        budget: &ScanBudget,
    ) -> Result<LineBatch> {
        file.seek(SeekFrom::Start(start))
            .map_err(|e| source.unavailable(e))?;
        let mut reader = BufReader::new(&mut *file);
        let mut buf = Vec::new();
        let mut batch = LineBatch {
            end: start,
            ..LineBatch::default()
        };

        loop {
            if batch.seen >= max_entries {
                batch.more = true;
                break;
            }
            budget.check(source, batch.seen)?;

            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| source.unavailable(e))?;
            if n == 0 || buf.last() != Some(&b'\n') {
                break;
            }
            let line_start = batch.end;
            batch.end += n as u64;

            let Ok(line) = std::str::from_utf8(&buf) else {
                batch.parse_errors += 1;
                log_parse_error(source, line_start, "line is not valid UTF-8".to_string());
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }
            batch.seen += 1;

            match self.parser.parse(line, &source.component) {
                Ok(mut record) => {
                    record.origin = Some(RecordOrigin {
                        path: origin_path.to_string(),
                        offset: line_start,
                    });
                    batch.records.push(record);
                }
                Err(reason) => {
                    batch.parse_errors += 1;
                    log_parse_error(source, line_start, reason);
                }
            }
        }
        Ok(batch)
    }

    /// Finishes the rotated copies of a replaced file.
    ///
    /// The old file keeps its generation so re-read lines dedup against the
    /// ones already imported; each newer copy takes the next generation.
    /// Returns the lines read and the generation for the current file.
    fn read_rotated(
        &self,
        source: &ComponentSource,
        offset: u64,
        generation: u32,
        fingerprint: Option<u64>,
        budget: &ScanBudget,
    ) -> Result<(LineBatch, u32)> {
        let chain = fingerprint
            .map(|fp| Self::rotated_chain(&source.path, fp))
            .unwrap_or_default();
        let mut batch = LineBatch::default();
        let mut next_generation = generation;

        for (i, rotated) in chain.iter().enumerate() {
            let start = if i == 0 { offset } else { 0 };
            let mut file = match File::open(rotated) {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!(
                        source = %source.key(),
                        rotated = %rotated.display(),
                        error = %e,
                        "rotated copy disappeared"
                    );
                    next_generation = next_generation.saturating_add(1);
                    continue;
                }
            };
            let origin = Self::origin_path(&source.path, next_generation);
            let part = self.read_lines(source, &mut file, start, &origin, usize::MAX, budget)?;
            tracing::debug!(
                source = %source.key(),
                rotated = %rotated.display(),
                lines = part.seen,
                "read rotated copy"
            );
            batch.absorb(part);
            next_generation = next_generation.saturating_add(1);
        }

        Ok((batch, next_generation.max(generation.saturating_add(1))))
    }
}

impl SourceReader for JsonLinesReader {
    fn read(
        &self,
        source: &ComponentSource,
        marker: Option<Marker>,
        budget: &ScanBudget,
    ) -> Result<ScanOutcome> {
        let (offset, generation, fingerprint) = match marker {
            None => (0, 0, None),
            Some(Marker::File {
                offset,
                generation,
                fingerprint,
            }) => (offset, generation, fingerprint),
            Some(other) => return Err(wrong_marker(source, other)),
        };

        let mut file = File::open(&source.path).map_err(|e| source.unavailable(e))?;
        let len = file.metadata().map_err(|e| source.unavailable(e))?.len();
        let current = file_fingerprint(&mut file).map_err(|e| source.unavailable(e))?;

        let replaced = offset > 0
            && (len < offset || fingerprint.is_some_and(|fp| current != Some(fp)));

        let (mut batch, start, generation) = if replaced {
            tracing::info!(
                source = %source.key(),
                previous_offset = offset,
                len,
                "file was replaced, following rotation"
            );
            let (rotated, generation) =
                self.read_rotated(source, offset, generation, fingerprint, budget)?;
            (rotated, 0, generation)
        } else {
            (LineBatch::default(), offset, generation)
        };

        let origin = Self::origin_path(&source.path, generation);
        let remaining = budget.max_entries.saturating_sub(batch.seen);
        let tail = self.read_lines(source, &mut file, start, &origin, remaining, budget)?;
        let (end, more) = (tail.end, tail.more);
        batch.absorb(tail);

        let fingerprint = match current {
            None if end > 0 => file_fingerprint(&mut file).map_err(|e| source.unavailable(e))?,
            other => other,
        };

        Ok(ScanOutcome {
            records: batch.records,
            parse_errors: batch.parse_errors,
            next_marker: Marker::File {
                offset: end,
                generation,
                fingerprint,
            },
            rewound: replaced,
            more,
        })
    }
}

// ========== SQLite tables ==========

/// Column candidates, in the order they are selected.
const TABLE_COLUMNS: &[&[&str]] = &[
    &["id"],
    &["timestamp", "created"],
    &["level", "levelname"],
    &["level_number", "level_no", "levelno"],
    &["logger_name", "name"],
    &["message", "msg"],
    FILE_KEYS,
    LINE_KEYS,
    FUNCTION_KEYS,
    &["module"],
    PROCESS_KEYS,
    PROCESS_NAME_KEYS,
    THREAD_KEYS,
    THREAD_NAME_KEYS,
    &["exception_info", "exc_info"],
    &["context"],
    &["extra"],
];

/// Table names LogLama databases have used for records.
///
/// A source naming one of these falls back to the others when its table is
/// missing, so `logs` also finds a `log_records` table.
pub const KNOWN_LOG_TABLES: &[&str] = &["logs", "log_records"];

/// Reads new rows from a log table in another SQLite database.
///
/// The database is opened read-only; the marker is the last imported row id.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteTableReader;

fn value_text(v: Value) -> Option<String> {
    match v {
        Value::Text(s) => Some(s),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Null | Value::Blob(_) => None,
    }
}

fn value_int(v: Value) -> Option<i64> {
    match v {
        Value::Integer(i) => Some(i),
        Value::Text(s) => s.trim().parse().ok(),
        #[allow(clippy::cast_possible_truncation)]
        Value::Real(f) => Some(f as i64),
        Value::Null | Value::Blob(_) => None,
    }
}

fn value_timestamp(v: Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Text(s) => parse_timestamp(&s),
        #[allow(clippy::cast_precision_loss)]
        Value::Integer(i) => timestamp_from_epoch(i as f64),
        Value::Real(f) => timestamp_from_epoch(f),
        Value::Null | Value::Blob(_) => None,
    }
}

fn value_context(v: Value) -> std::result::Result<ContextMap, String> {
    match value_text(v) {
        Some(s) if !s.trim().is_empty() => {
            serde_json::from_str(&s).map_err(|e| format!("context is not a JSON object: {e}"))
        }
        _ => Ok(ContextMap::new()),
    }
}

impl SqliteTableReader {
    /// Column names of `table`, empty when it does not exist.
    fn columns(conn: &Connection, source: &ComponentSource, table: &str) -> Result<Vec<String>> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info(\"{table}\")"))
            .map_err(|e| source.unavailable(e))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| source.unavailable(e))?;
        Ok(names)
    }

    fn row_to_record(
        values: Vec<Value>,
        component: &str,
    ) -> std::result::Result<LogRecord, String> {
        let mut it = values.into_iter();
        let mut next = || it.next().unwrap_or(Value::Null);

        let _id = next();
        let timestamp = value_timestamp(next()).ok_or("missing or unreadable timestamp")?;
        let level_name = value_text(next());
        let level_no = value_int(next());
        let level = match (level_name, level_no) {
            (Some(name), _) => name.parse::<LogLevel>().map_err(|e| e.to_string())?,
            (None, Some(rank)) => u32::try_from(rank)
                .ok()
                .and_then(LogLevel::from_rank)
                .ok_or_else(|| format!("unknown level rank {rank}"))?,
            (None, None) => return Err("missing level".to_string()),
        };
        let logger_name = value_text(next())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| component.to_string());
        let message = value_text(next()).ok_or("missing message")?;
        let file_path = value_text(next());
        let line_number = value_int(next()).and_then(|n| u32::try_from(n).ok());
        let function = value_text(next());
        let module = value_text(next());
        let process_id = value_int(next()).and_then(|n| u32::try_from(n).ok());
        let process_name = value_text(next());
        let thread_id = value_int(next()).and_then(|n| u64::try_from(n).ok());
        let thread_name = value_text(next());
        let exception_info = value_text(next());
        let mut context = value_context(next())?;
        context.extend(value_context(next())?);
        validate_context_keys(&context).map_err(|e| e.to_string())?;

        Ok(LogRecord {
            id: LogId::UNASSIGNED,
            timestamp,
            level,
            logger_name,
            message,
            file_path,
            line_number,
            function,
            module,
            process_id,
            process_name,
            thread_id,
            thread_name,
            exception_info,
            context,
            origin: None,
        })
    }
}

impl SourceReader for SqliteTableReader {
    fn read(
        &self,
        source: &ComponentSource,
        marker: Option<Marker>,
        budget: &ScanBudget,
    ) -> Result<ScanOutcome> {
        source.validate()?;
        let SourceKind::SqliteTable { table } = &source.kind else {
            return Err(LogError::validation(format!(
                "{} is not a table source",
                source.key()
            )));
        };
        let after = match marker {
            None => 0,
            Some(Marker::Row(id)) => id,
            Some(other) => return Err(wrong_marker(source, other)),
        };

        let conn = Connection::open_with_flags(
            &source.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| source.unavailable(e))?;
        conn.busy_timeout(Duration::from_secs(1))
            .map_err(|e| source.unavailable(e))?;

        let candidates: Vec<&str> = if KNOWN_LOG_TABLES.contains(&table.as_str()) {
            std::iter::once(table.as_str())
                .chain(KNOWN_LOG_TABLES.iter().copied().filter(|t| *t != table.as_str()))
                .collect()
        } else {
            vec![table.as_str()]
        };
        let mut resolved = None;
        for name in candidates {
            let columns = Self::columns(&conn, source, name)?;
            if !columns.is_empty() {
                resolved = Some((name, columns));
                break;
            }
        }
        let Some((table, present)) = resolved else {
            return Err(source.unavailable(format!("table '{table}' not found")));
        };

        let select: Vec<String> = TABLE_COLUMNS
            .iter()
            .map(|candidates| {
                candidates
                    .iter()
                    .find(|c| present.iter().any(|p| p == *c))
                    .map_or_else(|| "NULL".to_string(), |c| format!("\"{c}\""))
            })
            .collect();
        for (idx, what) in [(0, "id"), (1, "timestamp"), (5, "message")] {
            if select[idx] == "NULL" {
                return Err(source.unavailable(format!("table '{table}' has no {what} column")));
            }
        }
        if select[2] == "NULL" && select[3] == "NULL" {
            return Err(source.unavailable(format!("table '{table}' has no level column")));
        }

        let sql = format!(
            "SELECT {} FROM \"{table}\" WHERE \"id\" > ?1 ORDER BY \"id\" LIMIT ?2",
            select.join(", ")
        );
        let limit = i64::try_from(budget.max_entries).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(&sql).map_err(|e| source.unavailable(e))?;
        let mut rows = stmt
            .query(rusqlite::params![after, limit])
            .map_err(|e| source.unavailable(e))?;

        let origin_path = format!("{}#{table}", source.path.display());
        let mut records = Vec::new();
        let mut parse_errors = 0u64;
        let mut last = after;
        let mut seen = 0usize;

        while let Some(row) = rows.next().map_err(|e| source.unavailable(e))? {
            budget.check(source, seen)?;
            seen += 1;

            let values = (0..TABLE_COLUMNS.len())
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| source.unavailable(e))?;
            let id = match &values[0] {
                Value::Integer(id) => *id,
                _ => return Err(source.unavailable("row id is not an integer")),
            };
            last = id;
            let offset = u64::try_from(id).unwrap_or_default();

            match Self::row_to_record(values, &source.component) {
                Ok(mut record) => {
                    record.origin = Some(RecordOrigin {
                        path: origin_path.clone(),
                        offset,
                    });
                    records.push(record);
                }
                Err(reason) => {
                    parse_errors += 1;
                    log_parse_error(source, offset, reason);
                }
            }
        }

        Ok(ScanOutcome {
            records,
            parse_errors,
            next_marker: Marker::Row(last),
            rewound: false,
            more: seen >= budget.max_entries,
        })
    }
}
