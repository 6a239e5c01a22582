//! Logs command implementation.
//!
//! Lists stored records one page at a time.

use std::io::Write;

use lama_logs::{LogRecord, Page, QueryService};
use serde::Serialize;

use crate::cli::LogsArgs;
use crate::error::CliError;
use crate::output::{OutputFormat, TableDisplay, short_time, truncate};

/// Handler for the logs command.
pub struct LogsCommand<'a> {
    service: &'a QueryService,
}

impl<'a> LogsCommand<'a> {
    /// Creates a new logs command handler.
    #[must_use]
    pub const fn new(service: &'a QueryService) -> Self {
        Self { service }
    }

    /// Executes the logs command.
    ///
    /// # Errors
    ///
    /// Returns error if the request is invalid or the query fails.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &LogsArgs,
    ) -> Result<(), CliError> {
        let page = self.service.list_logs(&args.to_request())?;
        tracing::debug!(total = page.total, page = page.page, "listed records");
        format.write(
            out,
            &LogsOutput {
                page,
                verbose: args.verbose,
            },
        )
    }
}

// Output types

/// One page of records as shown by `loglama logs`.
#[derive(Debug, Clone, Serialize)]
pub struct LogsOutput {
    /// The page.
    #[serde(flatten)]
    pub page: Page,
    /// Print context and call site under each row.
    #[serde(skip)]
    pub verbose: bool,
}

fn write_details<W: Write>(writer: &mut W, record: &LogRecord) -> Result<(), CliError> {
    if let (Some(file), Some(line)) = (&record.file_path, record.line_number) {
        writeln!(writer, "      at {file}:{line}")?;
    }
    if !record.context.is_empty() {
        let context = serde_json::to_string(&record.context)
            .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
        writeln!(writer, "      context {context}")?;
    }
    if let Some(info) = &record.exception_info {
        for line in info.lines() {
            writeln!(writer, "      {line}")?;
        }
    }
    Ok(())
}

impl TableDisplay for LogsOutput {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let page = &self.page;
        if page.rows.is_empty() {
            writeln!(writer, "No matching records")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:>6}  {:<20}  {:<8}  {:<20}  MESSAGE",
            "ID", "TIME", "LEVEL", "COMPONENT"
        )?;
        writeln!(writer, "{}", "─".repeat(96))?;

        for record in &page.rows {
            writeln!(
                writer,
                "{:>6}  {:<20}  {:<8}  {:<20}  {}",
                record.id.to_string(),
                short_time(record.timestamp),
                record.level.as_str(),
                truncate(&record.logger_name, 20),
                record.message.lines().next().unwrap_or_default()
            )?;
            if self.verbose {
                write_details(writer, record)?;
            }
        }

        writeln!(writer)?;
        writeln!(
            writer,
            "Page {}/{} ({} record(s))",
            page.page,
            page.total_pages.max(1),
            page.total
        )?;
        Ok(())
    }
}
