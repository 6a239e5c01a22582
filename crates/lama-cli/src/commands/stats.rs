//! Stats command implementation.

use std::io::Write;

use lama_logs::{QueryService, Stats};

use crate::cli::FilterArgs;
use crate::error::CliError;
use crate::output::{OutputFormat, TableDisplay, short_time};

/// Handler for the stats command.
pub struct StatsCommand<'a> {
    service: &'a QueryService,
}

impl<'a> StatsCommand<'a> {
    /// Creates a new stats command handler.
    #[must_use]
    pub const fn new(service: &'a QueryService) -> Self {
        Self { service }
    }

    /// Executes the stats command.
    ///
    /// # Errors
    ///
    /// Returns error if the filters are invalid or the query fails.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &FilterArgs,
    ) -> Result<(), CliError> {
        let stats = self.service.stats(&args.to_request())?;
        format.write(out, &stats)
    }
}

impl TableDisplay for Stats {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Log Statistics")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Total Records:    {}", self.total)?;
        if let Some(range) = &self.date_range {
            writeln!(writer, "Oldest:           {}", short_time(range.start))?;
            writeln!(writer, "Newest:           {}", short_time(range.end))?;
        }
        if self.total == 0 {
            return Ok(());
        }

        writeln!(writer)?;
        writeln!(writer, "Levels")?;
        for entry in &self.level_counts {
            writeln!(writer, "  {:<16}{}", entry.level.as_str(), entry.count)?;
        }

        writeln!(writer)?;
        writeln!(writer, "Components")?;
        for entry in &self.component_counts {
            writeln!(writer, "  {:<16}{}", entry.component, entry.count)?;
        }
        Ok(())
    }
}
