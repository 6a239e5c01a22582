//! Emit command implementation.
//!
//! Writes one record through a [`Logger`], either straight into the store
//! or onto the component's log file for the collector to pick up later.

use std::io::Write;
use std::sync::Arc;

use lama_logs::{ContextMap, LamaConfig, LogLevel, LogStore, Logger, RecordSink};
use serde::Serialize;

use crate::cli::{EmitArgs, split_pair};
use crate::error::CliError;
use crate::output::{OutputFormat, TableDisplay};

/// Process name recorded on emitted records.
const PROCESS_NAME: &str = "loglama";

/// Parses `KEY=VALUE` context arguments. Values that are valid JSON keep
/// their type; anything else is stored as a string.
///
/// # Errors
///
/// Returns an error for a malformed pair.
pub fn parse_context(args: &[String]) -> Result<ContextMap, CliError> {
    let mut context = ContextMap::new();
    for arg in args {
        let (key, raw) = split_pair(arg, "--context")?;
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        context.insert(key.to_string(), value);
    }
    Ok(context)
}

/// Handler for the emit command.
pub struct EmitCommand<'a> {
    store: &'a Arc<LogStore>,
    config: &'a LamaConfig,
}

impl<'a> EmitCommand<'a> {
    /// Creates a new emit command handler.
    #[must_use]
    pub const fn new(store: &'a Arc<LogStore>, config: &'a LamaConfig) -> Self {
        Self { store, config }
    }

    /// Executes the emit command.
    ///
    /// # Errors
    ///
    /// Returns error if the level or context is invalid, or the record
    /// cannot be written.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &EmitArgs,
    ) -> Result<(), CliError> {
        let level: LogLevel = args.level.parse()?;
        let context = parse_context(&args.context)?;

        let (sink, destination): (Arc<dyn RecordSink>, String) = if args.to_file {
            let writer = self.config.file_writer()?;
            let path = writer.path_for(&args.component);
            (Arc::new(writer), path.display().to_string())
        } else {
            let db = self.config.db_path.display().to_string();
            (Arc::clone(self.store) as Arc<dyn RecordSink>, db)
        };

        let logger = Logger::new(args.component.trim(), Arc::clone(&sink))
            .with_limits(self.config.record_limits())
            .with_process_name(PROCESS_NAME);
        let id = logger.log_with(level, args.message.as_str(), context)?;
        sink.flush()?;

        format.write(
            out,
            &EmitOutput {
                id: id.map(|id| id.0),
                component: logger.name().to_string(),
                level,
                destination,
            },
        )
    }
}

// Output types

/// Where an emitted record went.
#[derive(Debug, Clone, Serialize)]
pub struct EmitOutput {
    /// Store id, if the record went to the database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Component name.
    pub component: String,
    /// Level.
    pub level: LogLevel,
    /// Database or file path.
    pub destination: String,
}

impl TableDisplay for EmitOutput {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        match self.id {
            Some(id) => writeln!(writer, "✓ Stored record {id} ({} {})", self.level, self.component)?,
            None => writeln!(
                writer,
                "✓ Appended {} record for {} to {}",
                self.level, self.component, self.destination
            )?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use lama_logs::{LogFilter, Sort};
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<LogStore>, LamaConfig) {
        let dir = TempDir::new().expect("temp dir");
        let config = LamaConfig::default()
            .with_log_dir(dir.path().join("logs"))
            .with_db_path(dir.path().join("loglama.db"))
            .with_max_message_length(8);
        let store = Arc::new(
            LogStore::open(&config.db_path, config.record_limits()).expect("store"),
        );
        (dir, store, config)
    }

    fn emit_args(level: &str, context: &[&str], to_file: bool) -> EmitArgs {
        EmitArgs {
            component: "auth".into(),
            message: "user signed in".into(),
            level: level.into(),
            context: context.iter().map(|s| (*s).to_string()).collect(),
            to_file,
        }
    }

    #[test]
    fn context_values_keep_json_types() {
        let context = parse_context(&[
            "attempts=3".to_string(),
            "user=alice".to_string(),
            "ok=true".to_string(),
        ])
        .expect("context");
        assert_eq!(context["attempts"], json!(3));
        assert_eq!(context["user"], json!("alice"));
        assert_eq!(context["ok"], json!(true));
    }

    #[test]
    fn emit_to_store_truncates_and_reports_id() {
        let (_dir, store, config) = setup();
        let mut out = Vec::new();
        EmitCommand::new(&store, &config)
            .execute(
                &mut out,
                &OutputFormat::new(Format::Json),
                &emit_args("warn", &["user=alice"], false),
            )
            .expect("execute");

        let parsed: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(parsed["level"], "WARNING");
        assert!(parsed["id"].as_i64().is_some());

        let records = store.query_all(&LogFilter::new(), Sort::default()).expect("query");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "user sig");
        assert_eq!(records[0].context["user"], json!("alice"));
        assert_eq!(records[0].process_name.as_deref(), Some("loglama"));
    }

    #[test]
    fn emit_to_file_appends_a_line() {
        let (_dir, store, config) = setup();
        let mut out = Vec::new();
        EmitCommand::new(&store, &config)
            .execute(&mut out, &OutputFormat::new(Format::Table), &emit_args("error", &[], true))
            .expect("execute");

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("✓ Appended ERROR record for auth"));
        let file = std::fs::read_to_string(config.log_dir.join("auth.log")).expect("log file");
        assert_eq!(file.lines().count(), 1);
        assert_eq!(store.count(&LogFilter::new()).expect("count"), 0);
    }

    #[test]
    fn emit_to_file_rotates_at_the_configured_size() {
        let (_dir, store, config) = setup();
        let config = config.with_rotation(1, 2);
        for _ in 0..3 {
            EmitCommand::new(&store, &config)
                .execute(&mut Vec::new(), &OutputFormat::default(), &emit_args("info", &[], true))
                .expect("execute");
        }

        let base = config.log_dir.join("auth.log");
        assert!(lama_logs::rotated_path(&base, 1).exists());
        assert!(lama_logs::rotated_path(&base, 2).exists());
        assert_eq!(std::fs::read_to_string(&base).expect("log file").lines().count(), 1);
    }

    #[test]
    fn reserved_context_key_is_refused() {
        let (_dir, store, config) = setup();
        let result = EmitCommand::new(&store, &config).execute(
            &mut Vec::new(),
            &OutputFormat::default(),
            &emit_args("info", &["levelname=DEBUG"], false),
        );
        assert!(matches!(result, Err(CliError::Log(e)) if e.is_validation()));
        assert_eq!(store.count(&LogFilter::new()).expect("count"), 0);
    }

    #[test]
    fn unknown_level_is_refused() {
        let (_dir, store, config) = setup();
        let result = EmitCommand::new(&store, &config).execute(
            &mut Vec::new(),
            &OutputFormat::default(),
            &emit_args("loud", &[], false),
        );
        assert!(result.is_err());
    }
}
