//! Per-component JSON-lines log files.
//!
//! [`JsonLinesWriter`] is the file side of the emit path: each record is
//! appended as one JSON object per line to `<log_dir>/<component>.log`,
//! which the [`Collector`](crate::collector::Collector) later discovers and
//! imports. Lines are written whole and flushed, so a reader only ever sees
//! a partial line while a write is in flight.
//!
//! With rotation enabled a file that would grow past `max_bytes` is renamed
//! to `<component>.log.1` (older copies shift up to `.backup_count`) and a
//! fresh file is started. The collector follows these renames.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{LogError, Result};
use crate::source::rotated_path;
use crate::traits::RecordSink;
use crate::types::{LogId, LogRecord, RecordLimits};

/// File extension used for component log files.
pub const LOG_FILE_EXTENSION: &str = "log";

/// Maps a component name onto a safe file name.
///
/// Dots are kept so `app.auth` lands in `app.auth.log` and the collector
/// recovers the same component from the file stem.
#[must_use]
pub fn component_file_name(component: &str) -> String {
    let stem: String = component
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.{LOG_FILE_EXTENSION}", stem.trim_matches('.'))
}

/// Default size at which a component file is rotated (10 MiB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Default number of rotated copies kept.
pub const DEFAULT_BACKUP_COUNT: u32 = 5;

/// Size-based rotation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    /// Rotate before a write would take the file past this size
    pub max_bytes: u64,
    /// Rotated copies kept; the oldest beyond this is deleted
    pub backup_count: u32,
}

impl Rotation {
    /// Returns `None` when either limit is zero, which disables rotation.
    #[must_use]
    pub const fn new(max_bytes: u64, backup_count: u32) -> Option<Self> {
        if max_bytes == 0 || backup_count == 0 {
            None
        } else {
            Some(Self {
                max_bytes,
                backup_count,
            })
        }
    }

    /// Shifts `path.1..` up by one, dropping the oldest, then moves `path`
    /// to `path.1`.
    fn roll(self, path: &Path) -> std::io::Result<()> {
        let oldest = rotated_path(path, self.backup_count);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.backup_count).rev() {
            let from = rotated_path(path, n);
            if from.exists() {
                fs::rename(&from, rotated_path(path, n + 1))?;
            }
        }
        fs::rename(path, rotated_path(path, 1))
    }
}

struct OpenLog {
    writer: BufWriter<File>,
    size: u64,
}

/// Appends records to per-component JSON-lines files.
pub struct JsonLinesWriter {
    log_dir: PathBuf,
    limits: RecordLimits,
    rotation: Option<Rotation>,
    files: Mutex<HashMap<String, OpenLog>>,
}

impl JsonLinesWriter {
    /// Creates a writer rooted at `log_dir`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(log_dir: impl Into<PathBuf>, limits: RecordLimits) -> Result<Self> {
        let log_dir = log_dir.into();
        fs::create_dir_all(&log_dir)?;
        Ok(Self {
            log_dir,
            limits,
            rotation: None,
            files: Mutex::new(HashMap::new()),
        })
    }

    /// Enables size-based rotation. Zero for either value turns it off.
    #[must_use]
    pub fn with_rotation(mut self, max_bytes: u64, backup_count: u32) -> Self {
        self.rotation = Rotation::new(max_bytes, backup_count);
        self
    }

    /// The active rotation policy, if any.
    #[must_use]
    pub const fn rotation(&self) -> Option<Rotation> {
        self.rotation
    }

    /// Directory the files are written to.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Path of the file a component's records go to.
    #[must_use]
    pub fn path_for(&self, component: &str) -> PathBuf {
        self.log_dir.join(component_file_name(component))
    }

    fn open(&self, component: &str) -> Result<OpenLog> {
        let path = self.path_for(component);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        tracing::debug!(component, path = %path.display(), size, "opened component log file");
        Ok(OpenLog {
            writer: BufWriter::new(file),
            size,
        })
    }

    /// The policy to apply if `incoming` more bytes would take a file of
    /// `size` bytes past the limit.
    fn due_rotation(&self, size: u64, incoming: u64) -> Option<Rotation> {
        self.rotation
            .filter(|r| size > 0 && size + incoming > r.max_bytes)
    }
}

impl RecordSink for JsonLinesWriter {
    fn emit(&self, mut record: LogRecord) -> Result<Option<LogId>> {
        record.enforce(&self.limits)?;
        record.id = LogId::UNASSIGNED;
        record.origin = None;

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let component = record.logger_name;
        let mut files = self.files.lock();
        let size = match files.get(&component) {
            Some(open) => open.size,
            None => fs::metadata(self.path_for(&component)).map_or(0, |m| m.len()),
        };
        if let Some(rotation) = self.due_rotation(size, line.len() as u64) {
            files.remove(&component);
            let path = self.path_for(&component);
            rotation.roll(&path)?;
            tracing::debug!(component, path = %path.display(), size, "rotated component log file");
        }

        let open = match files.entry(component.clone()) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => e.insert(self.open(&component)?),
        };
        if let Err(e) = open.writer.write_all(&line).and_then(|()| open.writer.flush()) {
            // Drop the handle so the next write reopens the file.
            files.remove(&component);
            return Err(LogError::Io(e));
        }
        open.size += line.len() as u64;
        Ok(None)
    }

    fn flush(&self) -> Result<()> {
        let mut files = self.files.lock();
        for open in files.values_mut() {
            open.writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for JsonLinesWriter {
    fn drop(&mut self) {
        for open in self.files.get_mut().values_mut() {
            let _ = open.writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LineParser;
    use crate::types::LogLevel;
    use tempfile::TempDir;

    fn make_record(logger: &str, message: &str) -> LogRecord {
        LogRecord::builder()
            .level(LogLevel::Info)
            .logger_name(logger)
            .message(message)
            .context("request_id", serde_json::json!("r-7"))
            .build(&RecordLimits::default())
            .expect("valid record")
    }

    #[test]
    fn component_file_names_are_safe() {
        assert_eq!(component_file_name("app.auth"), "app.auth.log");
        assert_eq!(component_file_name("../etc/passwd"), "_etc_passwd.log");
        assert_eq!(component_file_name("my service"), "my_service.log");
    }

    #[test]
    fn writes_one_line_per_record_per_component() {
        let dir = TempDir::new().expect("temp dir");
        let writer = JsonLinesWriter::new(dir.path(), RecordLimits::default()).expect("writer");

        assert_eq!(writer.emit(make_record("api", "one")).expect("emit"), None);
        writer.emit(make_record("api", "two")).expect("emit");
        writer.emit(make_record("worker", "three")).expect("emit");

        let api = fs::read_to_string(writer.path_for("api")).expect("read api");
        let worker = fs::read_to_string(writer.path_for("worker")).expect("read worker");
        assert_eq!(api.lines().count(), 2);
        assert_eq!(worker.lines().count(), 1);
        assert!(api.ends_with('\n'));
    }

    #[test]
    fn written_lines_parse_back() {
        let dir = TempDir::new().expect("temp dir");
        let writer = JsonLinesWriter::new(dir.path(), RecordLimits::default()).expect("writer");
        let record = make_record("api", "hello");
        writer.emit(record.clone()).expect("emit");

        let text = fs::read_to_string(writer.path_for("api")).expect("read");
        let parsed = LineParser::new()
            .parse(text.lines().next().expect("one line"), "api")
            .expect("parse");
        assert_eq!(parsed.timestamp, record.timestamp);
        assert_eq!(parsed.level, record.level);
        assert_eq!(parsed.message, "hello");
        assert_eq!(parsed.context["request_id"], serde_json::json!("r-7"));
    }

    #[test]
    fn rotation_keeps_backup_count_copies() {
        let dir = TempDir::new().expect("temp dir");
        let writer = JsonLinesWriter::new(dir.path(), RecordLimits::default())
            .expect("writer")
            .with_rotation(1, 2);
        for message in ["one", "two", "three", "four"] {
            writer.emit(make_record("api", message)).expect("emit");
        }

        let base = writer.path_for("api");
        let read = |path: &Path| fs::read_to_string(path).expect("read");
        assert!(read(&base).contains("four"));
        assert!(read(&rotated_path(&base, 1)).contains("three"));
        assert!(read(&rotated_path(&base, 2)).contains("two"));
        assert!(!rotated_path(&base, 3).exists());
    }

    #[test]
    fn rotation_waits_for_the_size_limit() {
        let dir = TempDir::new().expect("temp dir");
        let writer = JsonLinesWriter::new(dir.path(), RecordLimits::default())
            .expect("writer")
            .with_rotation(1 << 20, 5);
        writer.emit(make_record("api", "one")).expect("emit");
        writer.emit(make_record("api", "two")).expect("emit");

        let base = writer.path_for("api");
        assert_eq!(fs::read_to_string(&base).expect("read").lines().count(), 2);
        assert!(!rotated_path(&base, 1).exists());
    }

    #[test]
    fn rotation_resumes_size_of_existing_file() {
        let dir = TempDir::new().expect("temp dir");
        let base = dir.path().join("api.log");
        fs::write(&base, "x".repeat(100) + "\n").expect("seed");
        let writer = JsonLinesWriter::new(dir.path(), RecordLimits::default())
            .expect("writer")
            .with_rotation(120, 1);
        writer.emit(make_record("api", "one")).expect("emit");

        assert!(rotated_path(&base, 1).exists());
        assert!(fs::read_to_string(&base).expect("read").contains("one"));
    }

    #[test]
    fn zero_limits_disable_rotation() {
        assert_eq!(Rotation::new(0, 5), None);
        assert_eq!(Rotation::new(1024, 0), None);
        assert!(Rotation::new(1024, 1).is_some());
    }

    #[test]
    fn invalid_record_writes_nothing() {
        let dir = TempDir::new().expect("temp dir");
        let writer = JsonLinesWriter::new(dir.path(), RecordLimits::default()).expect("writer");
        let mut record = make_record("api", "x");
        record.context.insert("msg".into(), serde_json::json!("reserved"));

        assert!(writer.emit(record).is_err());
        assert!(!writer.path_for("api").exists());
    }
}
