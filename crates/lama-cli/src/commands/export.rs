//! Export command implementation.

use std::fs::File;
use std::io::{BufWriter, Write};

use lama_logs::{ExportFormat, LogStore, Sort, SortDirection, SortField};

use crate::cli::ExportArgs;
use crate::error::CliError;
use crate::output::{Message, OutputFormat};

/// Handler for the export command.
pub struct ExportCommand<'a> {
    store: &'a LogStore,
}

impl<'a> ExportCommand<'a> {
    /// Creates a new export command handler.
    #[must_use]
    pub const fn new(store: &'a LogStore) -> Self {
        Self { store }
    }

    /// Executes the export command. Records are written oldest first, to
    /// `--output` if given or to `out` otherwise.
    ///
    /// # Errors
    ///
    /// Returns error if the filters are invalid, the file cannot be
    /// created, or reading or writing fails.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &ExportArgs,
    ) -> Result<(), CliError> {
        let filter = args.filter.to_request().filter()?;
        let sort = Sort::new(SortField::Timestamp, SortDirection::Asc);
        let export_format = ExportFormat::from(args.export_format);

        match &args.output {
            Some(path) => {
                let mut file = BufWriter::new(File::create(path)?);
                let written = self.store.export(&filter, sort, export_format, &mut file)?;
                tracing::info!(path = %path.display(), written, format = %export_format, "exported records");
                format.write(
                    out,
                    &Message::success(format!(
                        "Exported {written} record(s) to {}",
                        path.display()
                    )),
                )
            }
            None => {
                let written = self.store.export(&filter, sort, export_format, out)?;
                tracing::info!(written, format = %export_format, "exported records");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{ExportFormatArg, FilterArgs};
    use chrono::DateTime;
    use lama_logs::{LogLevel, LogRecord, RecordLimits};
    use tempfile::TempDir;

    fn store() -> LogStore {
        let store = LogStore::open_in_memory(RecordLimits::default()).expect("store");
        for (secs, level, message) in [
            (30, LogLevel::Error, "third"),
            (10, LogLevel::Info, "first"),
            (20, LogLevel::Warning, "second"),
        ] {
            let record = LogRecord::builder()
                .timestamp(DateTime::from_timestamp(1_714_521_600 + secs, 0).expect("ts"))
                .level(level)
                .logger_name("billing")
                .message(message)
                .build(&RecordLimits::default())
                .expect("record");
            store.insert(record).expect("insert");
        }
        store
    }

    fn args(export_format: ExportFormatArg, output: Option<std::path::PathBuf>) -> ExportArgs {
        ExportArgs {
            filter: FilterArgs::default(),
            export_format,
            output,
        }
    }

    #[test]
    fn jsonl_to_stdout_is_oldest_first() {
        let store = store();
        let mut out = Vec::new();
        ExportCommand::new(&store)
            .execute(&mut out, &OutputFormat::default(), &args(ExportFormatArg::Jsonl, None))
            .expect("execute");

        let text = String::from_utf8(out).expect("utf8");
        let messages: Vec<String> = text
            .lines()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).expect("json line");
                v["message"].as_str().expect("message").to_string()
            })
            .collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn csv_to_file_reports_count() {
        let store = store();
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("out.csv");
        let mut out = Vec::new();
        ExportCommand::new(&store)
            .execute(
                &mut out,
                &OutputFormat::default(),
                &args(ExportFormatArg::Csv, Some(path.clone())),
            )
            .expect("execute");

        let message = String::from_utf8(out).expect("utf8");
        assert!(message.starts_with("✓ Exported 3 record(s)"));
        let csv = std::fs::read_to_string(&path).expect("read csv");
        assert_eq!(csv.lines().count(), 4);
    }

    #[test]
    fn filter_limits_export() {
        let store = store();
        let mut export_args = args(ExportFormatArg::Json, None);
        export_args.filter.min_level = Some("warning".into());
        let mut out = Vec::new();
        ExportCommand::new(&store)
            .execute(&mut out, &OutputFormat::default(), &export_args)
            .expect("execute");

        let parsed: serde_json::Value = serde_json::from_slice(&out).expect("json array");
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
    }
}
