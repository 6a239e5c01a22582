//! Collect and watch command implementations.
//!
//! Both build a [`Collector`] over the configured log directory plus any
//! sources named on the command line. `collect` runs one pass; `watch`
//! runs the background loop until interrupted.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use lama_logs::{
    CollectReport, Collector, ComponentSource, LamaConfig, LogFilter, LogStore, SourceState,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cli::{CollectArgs, WatchArgs, split_pair};
use crate::error::CliError;
use crate::output::{Message, OutputFormat, TableDisplay, truncate};

/// Table read from another LogLama database when the argument names none.
/// The reader also tries the other known table names.
const DEFAULT_DATABASE_TABLE: &str = "logs";

/// Parses `COMPONENT=PATH[#TABLE]` into a table source.
fn database_source(arg: &str) -> Result<ComponentSource, CliError> {
    let (component, target) = split_pair(arg, "--database")?;
    let (path, table) = match target.rsplit_once('#') {
        Some((path, table)) if !path.is_empty() && !table.is_empty() => (path, table),
        _ => (target, DEFAULT_DATABASE_TABLE),
    };
    Ok(ComponentSource::sqlite_table(component, path, table))
}

fn build_collector(
    store: &Arc<LogStore>,
    config: &LamaConfig,
    args: &CollectArgs,
) -> Result<Arc<Collector>, CliError> {
    std::fs::create_dir_all(&config.log_dir)?;
    let collector = Arc::new(Collector::new(Arc::clone(store), config.collector_config()));
    collector.discover(&config.log_dir)?;

    for arg in &args.files {
        let (component, path) = split_pair(arg, "--file")?;
        collector.register(ComponentSource::json_lines(component, path))?;
    }
    for arg in &args.databases {
        collector.register(database_source(arg)?)?;
    }

    if args.reset {
        for source in collector.sources() {
            if collector.reset(&source.key())? {
                tracing::info!(source = %source.key(), "import position reset");
            }
        }
    }
    Ok(collector)
}

/// Handler for the collect command.
pub struct CollectCommand<'a> {
    store: &'a Arc<LogStore>,
    config: &'a LamaConfig,
}

impl<'a> CollectCommand<'a> {
    /// Creates a new collect command handler.
    #[must_use]
    pub const fn new(store: &'a Arc<LogStore>, config: &'a LamaConfig) -> Self {
        Self { store, config }
    }

    /// Executes the collect command.
    ///
    /// # Errors
    ///
    /// Returns error if a source argument is malformed or the log directory
    /// cannot be listed. Per-source failures are part of the report.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &CollectArgs,
    ) -> Result<(), CliError> {
        let collector = build_collector(self.store, self.config, args)?;
        let report = collector
            .collect_once_async(&CancellationToken::new())
            .await;
        format.write(out, &CollectOutput { report })
    }
}

/// Handler for the watch command.
pub struct WatchCommand<'a> {
    store: &'a Arc<LogStore>,
    config: &'a LamaConfig,
}

impl<'a> WatchCommand<'a> {
    /// Creates a new watch command handler.
    #[must_use]
    pub const fn new(store: &'a Arc<LogStore>, config: &'a LamaConfig) -> Self {
        Self { store, config }
    }

    /// Executes the watch command: runs the collector every configured
    /// interval until Ctrl-C or `--duration` elapses.
    ///
    /// # Errors
    ///
    /// Returns error if the collector cannot be set up or the Ctrl-C handler
    /// cannot be installed.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &WatchArgs,
    ) -> Result<(), CliError> {
        if !self.config.collector_enabled {
            return format.write(out, &Message::info("Collector is disabled; nothing to watch"));
        }

        let collector = build_collector(self.store, self.config, &args.sources)?;
        let before = self.store.count(&LogFilter::new())?;

        let cancel = CancellationToken::new();
        let handle = Arc::clone(&collector).spawn(cancel.clone());

        let deadline = async {
            match args.duration {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            signal = tokio::signal::ctrl_c() => signal?,
            () = deadline => {}
        }

        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "collector task ended abnormally");
        }

        let after = self.store.count(&LogFilter::new())?;
        format.write(
            out,
            &Message::success(format!(
                "Stopped watching; imported {} record(s)",
                after.saturating_sub(before)
            )),
        )
    }
}

// Output types

/// Result of one collector pass.
#[derive(Debug, Clone, Serialize)]
pub struct CollectOutput {
    /// The pass report.
    #[serde(flatten)]
    pub report: CollectReport,
}

impl TableDisplay for CollectOutput {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let report = &self.report;
        if report.sources.is_empty() {
            writeln!(writer, "No sources found")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<20}  {:<10}  {:>8}  {:>8}  {:>6}  DETAIL",
            "COMPONENT", "STATE", "IMPORTED", "DUPES", "BAD"
        )?;
        writeln!(writer, "{}", "─".repeat(80))?;

        for source in &report.sources {
            let detail = if source.skipped_busy {
                "skipped (busy)".to_string()
            } else if let Some(error) = &source.error {
                let hint = if source.retryable { "retrying" } else { "needs fix" };
                format!("[{hint}] {}", truncate(error, 40))
            } else if source.rewound {
                "file rotated, re-read".to_string()
            } else {
                String::new()
            };
            let state = match source.state {
                SourceState::Failed => "failed",
                SourceState::Idle => "ok",
                SourceState::Scanning => "busy",
                SourceState::Unscanned => "pending",
            };
            writeln!(
                writer,
                "{:<20}  {:<10}  {:>8}  {:>8}  {:>6}  {}",
                truncate(&source.component, 20),
                state,
                source.imported,
                source.duplicates,
                source.parse_errors + source.storage_errors,
                detail
            )?;
        }

        writeln!(writer)?;
        writeln!(
            writer,
            "Imported {} record(s) from {} source(s), {} failed",
            report.imported,
            report.sources.len(),
            report.failed_sources
        )?;
        Ok(())
    }
}
