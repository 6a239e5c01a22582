//! SQLite-backed record store.
//!
//! This module provides:
//! - [`LogStore`] — Durable storage with insert, dedup insert, filtered
//!   query, aggregate, delete and export
//! - [`InsertOutcome`] / [`BatchOutcome`] — Results of collector imports
//! - [`Aggregate`] — Level, component and date-range breakdowns
//! - Implementation of [`RecordSink`] so loggers can write straight to disk
//!
//! All writers go through SQLite's own locking: one connection per handle
//! behind a mutex, WAL journaling and a busy timeout so several processes
//! can share one database file. The mutex is only held for the duration of
//! a statement or transaction, never while the caller does its own I/O.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter};
use serde::{Deserialize, Serialize};

use crate::error::{LogError, Result};
use crate::source::Marker;
use crate::traits::RecordSink;
use crate::types::{
    ComponentFilter, ContextMap, LevelFilter, LogFilter, LogId, LogLevel, LogRecord,
    PageRequest, RecordLimits, RecordOrigin, Sort, format_timestamp,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS logs (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp       TEXT    NOT NULL,
    level           TEXT    NOT NULL,
    level_no        INTEGER NOT NULL,
    logger_name     TEXT    NOT NULL,
    message         TEXT    NOT NULL,
    file_path       TEXT,
    line_number     INTEGER,
    function        TEXT,
    module          TEXT,
    process_id      INTEGER,
    process_name    TEXT,
    thread_id       INTEGER,
    thread_name     TEXT,
    exception_info  TEXT,
    context         TEXT    NOT NULL DEFAULT '{}',
    source_path     TEXT,
    source_offset   INTEGER
);
CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs (timestamp, id);
CREATE INDEX IF NOT EXISTS idx_logs_level_no ON logs (level_no);
CREATE INDEX IF NOT EXISTS idx_logs_logger_name ON logs (logger_name);
CREATE INDEX IF NOT EXISTS idx_logs_content ON logs (logger_name, timestamp, message);
CREATE UNIQUE INDEX IF NOT EXISTS idx_logs_origin
    ON logs (source_path, source_offset) WHERE source_path IS NOT NULL;
CREATE TABLE IF NOT EXISTS collector_markers (
    source_key  TEXT    PRIMARY KEY,
    component   TEXT    NOT NULL,
    kind        TEXT    NOT NULL,
    position    INTEGER NOT NULL,
    generation  INTEGER NOT NULL DEFAULT 0,
    fingerprint INTEGER,
    updated_at  TEXT    NOT NULL
);
";

/// SQL function folding text to Unicode lower case; SQLite's own `lower`
/// and `LIKE` only fold ASCII.
const LOWER_FN: &str = "lama_lower";

const COLUMNS: &str = "id, timestamp, level, level_no, logger_name, message, file_path, \
    line_number, function, module, process_id, process_name, thread_id, thread_name, \
    exception_info, context, source_path, source_offset";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a dedup-aware insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was new and got this id.
    Inserted(LogId),
    /// An equivalent record was already stored.
    Duplicate,
}

/// Counts from one collector import batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Newly stored records
    pub inserted: u64,
    /// Records skipped as already present
    pub duplicates: u64,
    /// Records skipped because validation or the insert failed
    pub failed: u64,
}

/// One page of query results plus the total match count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Rows on this page
    pub rows: Vec<LogRecord>,
    /// Rows matching the filter across all pages
    pub total: u64,
}

/// Earliest and latest timestamps in a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Oldest matching timestamp
    pub start: DateTime<Utc>,
    /// Newest matching timestamp
    pub end: DateTime<Utc>,
}

/// Grouped counts over a filtered result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Count per level (levels with no rows are omitted)
    pub level_counts: BTreeMap<LogLevel, u64>,
    /// Count per component
    pub component_counts: BTreeMap<String, u64>,
    /// Timestamp span, `None` when nothing matches
    pub date_range: Option<DateRange>,
    /// Rows matching the filter
    pub total: u64,
}

/// What a delete removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteScope {
    /// Every record.
    All,
    /// Exactly the records matching the filter.
    Matching(LogFilter),
}

/// Portable formats for [`LogStore::export`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// A single JSON array
    #[default]
    Json,
    /// One JSON object per line
    JsonLines,
    /// Comma-separated values with a header row
    Csv,
}

impl FromStr for ExportFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Ok(Self::JsonLines),
            "csv" => Ok(Self::Csv),
            other => Err(LogError::validation(format!("unknown export format '{other}'"))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::JsonLines => "jsonl",
            Self::Csv => "csv",
        })
    }
}

/// Durable, queryable record store.
pub struct LogStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    limits: RecordLimits,
}

/// Shared store handle.
pub type SharedLogStore = Arc<LogStore>;

impl LogStore {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or database cannot be
    /// created, or the schema cannot be applied.
    pub fn open(path: impl AsRef<Path>, limits: RecordLimits) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        prepare_connection(&conn)?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened log store");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
            limits,
        })
    }

    /// Opens a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory(limits: RecordLimits) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        prepare_connection(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            limits,
        })
    }

    /// Database file path, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Limits applied to every insert.
    #[must_use]
    pub const fn limits(&self) -> &RecordLimits {
        &self.limits
    }

    /// Appends one record and returns its new id.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Validation`] for a reserved context key (nothing
    /// is written) or [`LogError::Storage`] if SQLite fails.
    pub fn insert(&self, mut record: LogRecord) -> Result<LogId> {
        record.enforce(&self.limits)?;
        let conn = self.conn.lock();
        insert_row(&conn, &record)
    }

    /// Inserts a record unless an equivalent one is already stored.
    ///
    /// A record is a duplicate when a stored row has the same origin
    /// (`source_path`, `source_offset`) or the same
    /// (`logger_name`, `timestamp`, `message`).
    ///
    /// # Errors
    ///
    /// Returns an error on validation or storage failure; a duplicate is
    /// not an error.
    pub fn insert_if_absent(&self, mut record: LogRecord) -> Result<InsertOutcome> {
        record.enforce(&self.limits)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = if is_duplicate(&tx, &record)? {
            InsertOutcome::Duplicate
        } else {
            InsertOutcome::Inserted(insert_row(&tx, &record)?)
        };
        tx.commit()?;
        Ok(outcome)
    }

    /// Imports a batch of collected records and advances the source marker
    /// in the same transaction.
    ///
    /// Records that fail validation or insertion are logged and counted as
    /// failed without aborting the batch. If the commit fails nothing is
    /// stored and the marker stays where it was.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be opened or committed.
    pub fn import_batch(
        &self,
        source_key: &str,
        component: &str,
        records: Vec<LogRecord>,
        marker: Marker,
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for mut record in records {
            if let Err(e) = record.enforce(&self.limits) {
                tracing::warn!(source = source_key, error = %e, "skipping invalid record");
                outcome.failed += 1;
                continue;
            }
            let result = is_duplicate(&tx, &record).and_then(|dup| {
                if dup {
                    Ok(None)
                } else {
                    insert_row(&tx, &record).map(Some)
                }
            });
            match result {
                Ok(Some(_)) => outcome.inserted += 1,
                Ok(None) => outcome.duplicates += 1,
                Err(e) => {
                    tracing::warn!(
                        source = source_key,
                        offset = record.origin.as_ref().map(|o| o.offset),
                        error = %e,
                        "failed to store record, skipping"
                    );
                    outcome.failed += 1;
                }
            }
        }

        write_marker(&tx, source_key, component, marker)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Fetches one record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: LogId) -> Result<Option<LogRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {COLUMNS} FROM logs WHERE id = ?1");
        Ok(conn.query_row(&sql, [id.0], row_to_record).optional()?)
    }

    /// Returns one page of matching records and the total match count.
    ///
    /// Both are read in one transaction so they agree with each other.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Validation`] for a malformed filter before the
    /// database is touched, or a storage error.
    pub fn query(&self, filter: &LogFilter, sort: Sort, page: PageRequest) -> Result<QueryResult> {
        filter.validate()?;
        let (clause, mut values) = where_clause(filter);
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let total = count_with(&tx, &clause, &values)?;
        let sql = format!(
            "SELECT {COLUMNS} FROM logs{clause} {} LIMIT ? OFFSET ?",
            sort.order_by()
        );
        values.push(Value::Integer(i64::from(page.page_size)));
        values.push(Value::Integer(to_sql_int(page.offset())));
        let rows = select_with(&tx, &sql, &values)?;
        tx.commit()?;

        Ok(QueryResult { rows, total })
    }

    /// Returns every matching record in sort order, without pagination.
    ///
    /// # Errors
    ///
    /// Returns a validation or storage error.
    pub fn query_all(&self, filter: &LogFilter, sort: Sort) -> Result<Vec<LogRecord>> {
        filter.validate()?;
        let (clause, values) = where_clause(filter);
        let sql = format!("SELECT {COLUMNS} FROM logs{clause} {}", sort.order_by());
        let conn = self.conn.lock();
        select_with(&conn, &sql, &values)
    }

    /// Counts matching records.
    ///
    /// # Errors
    ///
    /// Returns a validation or storage error.
    pub fn count(&self, filter: &LogFilter) -> Result<u64> {
        filter.validate()?;
        let (clause, values) = where_clause(filter);
        let conn = self.conn.lock();
        count_with(&conn, &clause, &values)
    }

    /// Groups matching records by level and component and reports their
    /// date span.
    ///
    /// # Errors
    ///
    /// Returns a validation or storage error.
    pub fn aggregate(&self, filter: &LogFilter) -> Result<Aggregate> {
        filter.validate()?;
        let (clause, values) = where_clause(filter);
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut aggregate = Aggregate::default();

        {
            let sql = format!("SELECT level_no, COUNT(*) FROM logs{clause} GROUP BY level_no");
            let mut stmt = tx.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(values.iter()))?;
            while let Some(row) = rows.next()? {
                let rank: u32 = row.get(0)?;
                let count: i64 = row.get(1)?;
                if let Some(level) = LogLevel::from_rank(rank) {
                    *aggregate.level_counts.entry(level).or_default() += count as u64;
                }
            }
        }

        {
            let sql =
                format!("SELECT logger_name, COUNT(*) FROM logs{clause} GROUP BY logger_name");
            let mut stmt = tx.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(values.iter()))?;
            while let Some(row) = rows.next()? {
                let name: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                aggregate.component_counts.insert(name, count as u64);
            }
        }

        let sql = format!("SELECT MIN(timestamp), MAX(timestamp), COUNT(*) FROM logs{clause}");
        let (min, max, total): (Option<String>, Option<String>, i64) = tx.query_row(
            &sql,
            params_from_iter(values.iter()),
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        tx.commit()?;

        aggregate.total = total as u64;
        if let (Some(min), Some(max)) = (min, max) {
            aggregate.date_range = Some(DateRange {
                start: parse_stored_timestamp(&min)?,
                end: parse_stored_timestamp(&max)?,
            });
        }
        Ok(aggregate)
    }

    /// Deletes records and returns how many were removed.
    ///
    /// Collector markers are kept, so clearing the store does not cause
    /// already-imported lines to be imported again.
    ///
    /// # Errors
    ///
    /// Returns a validation or storage error.
    pub fn delete(&self, scope: &DeleteScope) -> Result<u64> {
        let deleted = match scope {
            DeleteScope::All => {
                let conn = self.conn.lock();
                conn.execute("DELETE FROM logs", [])?
            }
            DeleteScope::Matching(filter) => {
                filter.validate()?;
                let (clause, values) = where_clause(filter);
                let conn = self.conn.lock();
                conn.execute(
                    &format!("DELETE FROM logs{clause}"),
                    params_from_iter(values.iter()),
                )?
            }
        };
        tracing::info!(deleted, "deleted log records");
        Ok(deleted as u64)
    }

    /// Writes every matching record to `out` in the given format.
    ///
    /// Rows are read first and the store lock released before any bytes
    /// are written to `out`.
    ///
    /// # Errors
    ///
    /// Returns a validation, storage, serialization or I/O error.
    pub fn export<W: Write>(
        &self,
        filter: &LogFilter,
        sort: Sort,
        format: ExportFormat,
        out: &mut W,
    ) -> Result<u64> {
        let rows = self.query_all(filter, sort)?;
        match format {
            ExportFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, &rows)?;
                writeln!(out)?;
            }
            ExportFormat::JsonLines => {
                for row in &rows {
                    serde_json::to_writer(&mut *out, row)?;
                    writeln!(out)?;
                }
            }
            ExportFormat::Csv => write_csv(out, &rows)?,
        }
        out.flush()?;
        Ok(rows.len() as u64)
    }

    /// Distinct component names, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn components(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT logger_name FROM logs ORDER BY logger_name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Levels that have at least one record, in severity order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn levels(&self) -> Result<Vec<LogLevel>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT level_no FROM logs ORDER BY level_no")?;
        let ranks = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<u32>>>()?;
        Ok(ranks.into_iter().filter_map(LogLevel::from_rank).collect())
    }

    /// Loads the stored import marker for a source.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored kind is unknown.
    pub fn load_marker(&self, source_key: &str) -> Result<Option<Marker>> {
        let conn = self.conn.lock();
        let row: Option<(String, i64, i64, Option<i64>)> = conn
            .query_row(
                "SELECT kind, position, generation, fingerprint FROM collector_markers \
                 WHERE source_key = ?1",
                [source_key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        row.map(|(kind, position, generation, fingerprint)| {
            Marker::from_parts(&kind, position, generation, fingerprint)
        })
        .transpose()
    }

    /// Stores an import marker outside of a batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save_marker(&self, source_key: &str, component: &str, marker: Marker) -> Result<()> {
        let conn = self.conn.lock();
        write_marker(&conn, source_key, component, marker)
    }

    /// Forgets the marker for a source so the next pass starts over.
    ///
    /// Returns true if a marker existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn reset_marker(&self, source_key: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "DELETE FROM collector_markers WHERE source_key = ?1",
            [source_key],
        )?;
        Ok(n > 0)
    }
}

impl RecordSink for LogStore {
    fn emit(&self, record: LogRecord) -> Result<Option<LogId>> {
        self.insert(record).map(Some)
    }
}

// ========== Internal helpers ==========

/// Applies the schema, upgrades older files and registers SQL functions.
fn prepare_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let has_fingerprint: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pragma_table_info('collector_markers') \
         WHERE name = 'fingerprint')",
        [],
        |row| row.get(0),
    )?;
    if !has_fingerprint {
        conn.execute_batch("ALTER TABLE collector_markers ADD COLUMN fingerprint INTEGER")?;
        tracing::info!("added fingerprint column to collector_markers");
    }

    conn.create_scalar_function(
        LOWER_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )?;
    Ok(())
}

fn to_sql_int(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Builds the `WHERE` clause shared by query, aggregate, delete and export.
fn where_clause(filter: &LogFilter) -> (String, Vec<Value>) {
    let mut conditions: Vec<&'static str> = Vec::new();
    let mut values = Vec::new();

    match filter.level {
        Some(LevelFilter::Exact(level)) => {
            conditions.push("level_no = ?");
            values.push(Value::Integer(i64::from(level.rank())));
        }
        Some(LevelFilter::AtLeast(level)) => {
            conditions.push("level_no >= ?");
            values.push(Value::Integer(i64::from(level.rank())));
        }
        None => {}
    }

    match &filter.component {
        Some(ComponentFilter::Exact(name)) => {
            conditions.push("logger_name = ?");
            values.push(Value::Text(name.clone()));
        }
        Some(ComponentFilter::Prefix(prefix)) => {
            conditions.push("(logger_name = ? OR logger_name LIKE ? ESCAPE '\\')");
            values.push(Value::Text(prefix.clone()));
            values.push(Value::Text(format!("{}.%", escape_like(prefix))));
        }
        None => {}
    }

    if let Some(search) = &filter.search {
        conditions.push("instr(lama_lower(message), ?) > 0");
        values.push(Value::Text(search.to_lowercase()));
    }

    if let Some(start) = filter.time_range.start {
        conditions.push("timestamp >= ?");
        values.push(Value::Text(format_timestamp(start)));
    }
    if let Some(end) = filter.time_range.end {
        conditions.push("timestamp <= ?");
        values.push(Value::Text(format_timestamp(end)));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

fn count_with(conn: &Connection, clause: &str, values: &[Value]) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM logs{clause}");
    let n: i64 = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
    Ok(n as u64)
}

fn select_with(conn: &Connection, sql: &str, values: &[Value]) -> Result<Vec<LogRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn insert_row(conn: &Connection, record: &LogRecord) -> Result<LogId> {
    let context = serde_json::to_string(&record.context)?;
    conn.execute(
        "INSERT INTO logs (timestamp, level, level_no, logger_name, message, file_path, \
         line_number, function, module, process_id, process_name, thread_id, thread_name, \
         exception_info, context, source_path, source_offset) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            format_timestamp(record.timestamp),
            record.level.as_str(),
            record.level.rank(),
            record.logger_name,
            record.message,
            record.file_path,
            record.line_number,
            record.function,
            record.module,
            record.process_id,
            record.process_name,
            record.thread_id.map(|t| t as i64),
            record.thread_name,
            record.exception_info,
            context,
            record.origin.as_ref().map(|o| o.path.as_str()),
            record.origin.as_ref().map(|o| to_sql_int(o.offset)),
        ],
    )?;
    Ok(LogId(conn.last_insert_rowid()))
}

fn is_duplicate(conn: &Connection, record: &LogRecord) -> Result<bool> {
    if let Some(origin) = &record.origin {
        let seen: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM logs WHERE source_path = ?1 AND source_offset = ?2)",
            params![origin.path, to_sql_int(origin.offset)],
            |row| row.get(0),
        )?;
        if seen {
            return Ok(true);
        }
    }
    let seen: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM logs \
         WHERE logger_name = ?1 AND timestamp = ?2 AND message = ?3)",
        params![
            record.logger_name,
            format_timestamp(record.timestamp),
            record.message
        ],
        |row| row.get(0),
    )?;
    Ok(seen)
}

fn write_marker(conn: &Connection, source_key: &str, component: &str, marker: Marker) -> Result<()> {
    let (kind, position, generation, fingerprint) = marker.to_parts();
    conn.execute(
        "INSERT INTO collector_markers \
         (source_key, component, kind, position, generation, fingerprint, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
         ON CONFLICT(source_key) DO UPDATE SET \
         component = excluded.component, kind = excluded.kind, \
         position = excluded.position, generation = excluded.generation, \
         fingerprint = excluded.fingerprint, updated_at = excluded.updated_at",
        params![
            source_key,
            component,
            kind,
            position,
            generation,
            fingerprint,
            format_timestamp(Utc::now())
        ],
    )?;
    Ok(())
}

fn parse_stored_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LogError::validation(format!("stored timestamp '{s}' is invalid: {e}")))
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<LogRecord> {
    let timestamp: String = row.get(1)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| conversion_error(1, e))?
        .with_timezone(&Utc);

    let rank: u32 = row.get(3)?;
    let level = match LogLevel::from_rank(rank) {
        Some(level) => level,
        None => row
            .get::<_, String>(2)?
            .parse::<LogLevel>()
            .map_err(|e| conversion_error(2, e))?,
    };

    let context: String = row.get(15)?;
    let context: ContextMap = serde_json::from_str(&context).unwrap_or_else(|_| {
        let mut raw = ContextMap::new();
        raw.insert("_raw".to_string(), serde_json::Value::String(context));
        raw
    });

    let source_path: Option<String> = row.get(16)?;
    let source_offset: Option<i64> = row.get(17)?;
    let origin = source_path.map(|path| RecordOrigin {
        path,
        offset: source_offset.unwrap_or_default().max(0) as u64,
    });

    Ok(LogRecord {
        id: LogId(row.get(0)?),
        timestamp,
        level,
        logger_name: row.get(4)?,
        message: row.get(5)?,
        file_path: row.get(6)?,
        line_number: row.get(7)?,
        function: row.get(8)?,
        module: row.get(9)?,
        process_id: row.get(10)?,
        process_name: row.get(11)?,
        thread_id: row.get::<_, Option<i64>>(12)?.map(|t| t as u64),
        thread_name: row.get(13)?,
        exception_info: row.get(14)?,
        context,
        origin,
    })
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_csv<W: Write>(out: &mut W, rows: &[LogRecord]) -> Result<()> {
    writeln!(
        out,
        "id,timestamp,level,level_no,logger_name,message,file_path,line_number,function,\
         module,process_id,process_name,thread_id,thread_name,exception_info,context"
    )?;
    for r in rows {
        let opt = |v: &Option<String>| v.as_deref().map(csv_field).unwrap_or_default();
        let num = |v: Option<String>| v.unwrap_or_default();
        let fields = [
            r.id.to_string(),
            format_timestamp(r.timestamp),
            r.level.as_str().to_string(),
            r.level.rank().to_string(),
            csv_field(&r.logger_name),
            csv_field(&r.message),
            opt(&r.file_path),
            num(r.line_number.map(|n| n.to_string())),
            opt(&r.function),
            opt(&r.module),
            num(r.process_id.map(|n| n.to_string())),
            opt(&r.process_name),
            num(r.thread_id.map(|n| n.to_string())),
            opt(&r.thread_name),
            opt(&r.exception_info),
            csv_field(&serde_json::to_string(&r.context)?),
        ];
        writeln!(out, "{}", fields.join(","))?;
    }
    Ok(())
}
