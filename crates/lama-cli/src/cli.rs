//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use lama_logs::{ExportFormat, LamaConfig, ListRequest};

use crate::error::CliError;

/// LogLama - collect, store and query component logs.
#[derive(Parser, Debug, Clone)]
#[command(name = "loglama")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML config file; flags and environment variables override it.
    #[arg(long, env = "LOGLAMA_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding per-component log files.
    #[arg(long, env = "LOGLAMA_LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    /// SQLite database file.
    #[arg(long, env = "LOGLAMA_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Truncate messages longer than this many characters.
    #[arg(long, env = "LOGLAMA_MAX_MESSAGE_LENGTH", global = true)]
    pub max_message_length: Option<usize>,

    /// Seconds between collector passes in `watch`.
    #[arg(long, env = "LOGLAMA_COLLECTOR_INTERVAL", global = true)]
    pub collector_interval: Option<u64>,

    /// Whether `watch` runs the collector.
    #[arg(long, env = "LOGLAMA_COLLECTOR_ENABLED", global = true)]
    pub collector_enabled: Option<bool>,

    /// Rotate component log files before they grow past this many bytes
    /// (0 disables rotation).
    #[arg(long, env = "LOGLAMA_MAX_LOG_SIZE", global = true)]
    pub max_log_size: Option<u64>,

    /// Rotated copies kept per component log file (0 disables rotation).
    #[arg(long, env = "LOGLAMA_BACKUP_COUNT", global = true)]
    pub backup_count: Option<u32>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table, global = true)]
    pub format: Format,

    /// Emit diagnostics on stderr as JSON.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Builds the effective configuration: the config file (or defaults)
    /// with any flag or environment value laid over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is unreadable or the result is
    /// invalid.
    pub fn load_config(&self) -> Result<LamaConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => LamaConfig::from_file(path)?,
            None => LamaConfig::default(),
        };

        if let Some(dir) = &self.log_dir {
            config.log_dir.clone_from(dir);
            // A db path from the file still wins; otherwise keep it beside the logs.
            if self.config.is_none() && self.db_path.is_none() {
                config.db_path = dir.join("loglama.db");
            }
        }
        if let Some(path) = &self.db_path {
            config.db_path.clone_from(path);
        }
        if let Some(max) = self.max_message_length {
            config.max_message_length = max;
        }
        if let Some(secs) = self.collector_interval {
            config.collector_interval_secs = secs;
        }
        if let Some(enabled) = self.collector_enabled {
            config.collector_enabled = enabled;
        }
        if let Some(bytes) = self.max_log_size {
            config.max_log_size = bytes;
        }
        if let Some(count) = self.backup_count {
            config.backup_count = count;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List stored records, newest first.
    Logs(LogsArgs),

    /// Show counts per level and component.
    Stats(FilterArgs),

    /// Delete stored records.
    Clear(ClearArgs),

    /// Write matching records to a file or stdout.
    Export(ExportArgs),

    /// Import new lines from every log file once.
    Collect(CollectArgs),

    /// Keep importing on an interval until interrupted.
    Watch(WatchArgs),

    /// Store a single record.
    Emit(EmitArgs),
}

/// Record filters shared by several commands.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only this level.
    #[arg(short, long)]
    pub level: Option<String>,

    /// This level or more severe.
    #[arg(long, conflicts_with = "level")]
    pub min_level: Option<String>,

    /// Only this component.
    #[arg(short, long)]
    pub component: Option<String>,

    /// This component and its dotted children.
    #[arg(long, conflicts_with = "component")]
    pub component_prefix: Option<String>,

    /// Case-insensitive text to look for in messages.
    #[arg(short, long)]
    pub search: Option<String>,

    /// Inclusive start (RFC 3339 or YYYY-MM-DD[ HH:MM:SS]).
    #[arg(long)]
    pub since: Option<String>,

    /// Inclusive end; a bare date covers the whole day.
    #[arg(long)]
    pub until: Option<String>,
}

impl FilterArgs {
    /// Returns true if no filter was given.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.level.is_none()
            && self.min_level.is_none()
            && self.component.is_none()
            && self.component_prefix.is_none()
            && self.search.is_none()
            && self.since.is_none()
            && self.until.is_none()
    }

    /// Converts the filters into a query-service request.
    #[must_use]
    pub fn to_request(&self) -> ListRequest {
        ListRequest {
            level: self.level.clone(),
            min_level: self.min_level.clone(),
            component: self.component.clone(),
            component_prefix: self.component_prefix.clone(),
            search: self.search.clone(),
            start_date: self.since.clone(),
            end_date: self.until.clone(),
            ..ListRequest::default()
        }
    }
}

/// Arguments for the logs command.
#[derive(Args, Debug, Clone)]
pub struct LogsArgs {
    /// Filters.
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Page number, starting at 1.
    #[arg(short, long, default_value = "1")]
    pub page: u32,

    /// Rows per page.
    #[arg(short = 'n', long)]
    pub page_size: Option<u32>,

    /// Sort column: timestamp, level, component, message or id.
    #[arg(long)]
    pub sort_by: Option<String>,

    /// Sort direction: asc or desc.
    #[arg(long)]
    pub sort_dir: Option<String>,

    /// Show context and call site under each row.
    #[arg(short, long)]
    pub verbose: bool,
}

impl LogsArgs {
    /// Converts the arguments into a query-service request.
    #[must_use]
    pub fn to_request(&self) -> ListRequest {
        ListRequest {
            page: Some(self.page),
            page_size: self.page_size,
            sort_by: self.sort_by.clone(),
            sort_dir: self.sort_dir.clone(),
            ..self.filter.to_request()
        }
    }
}

/// Arguments for the clear command.
#[derive(Args, Debug, Clone)]
pub struct ClearArgs {
    /// Only delete records matching these filters.
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Confirm the deletion.
    #[arg(short, long)]
    pub yes: bool,
}

/// Export file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ExportFormatArg {
    /// A single JSON array.
    #[default]
    Json,
    /// One JSON object per line.
    Jsonl,
    /// Comma-separated values.
    Csv,
}

impl From<ExportFormatArg> for ExportFormat {
    fn from(arg: ExportFormatArg) -> Self {
        match arg {
            ExportFormatArg::Json => Self::Json,
            ExportFormatArg::Jsonl => Self::JsonLines,
            ExportFormatArg::Csv => Self::Csv,
        }
    }
}

/// Arguments for the export command.
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Filters.
    #[command(flatten)]
    pub filter: FilterArgs,

    /// File format.
    #[arg(long = "as", value_enum, default_value_t = ExportFormatArg::Json)]
    pub export_format: ExportFormatArg,

    /// Output file; stdout if omitted.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the collect command.
#[derive(Args, Debug, Clone, Default)]
pub struct CollectArgs {
    /// Extra JSON-lines files to import, as COMPONENT=PATH.
    #[arg(long = "file", value_name = "COMPONENT=PATH")]
    pub files: Vec<String>,

    /// Other LogLama databases to import from, as COMPONENT=PATH[#TABLE].
    /// Without a table, `logs` is read, falling back to `log_records`.
    #[arg(long = "database", value_name = "COMPONENT=PATH[#TABLE]")]
    pub databases: Vec<String>,

    /// Forget the import position of every source first.
    #[arg(long)]
    pub reset: bool,
}

/// Arguments for the watch command.
#[derive(Args, Debug, Clone, Default)]
pub struct WatchArgs {
    /// Sources, as for `collect`.
    #[command(flatten)]
    pub sources: CollectArgs,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    pub duration: Option<u64>,
}

/// Arguments for the emit command.
#[derive(Args, Debug, Clone)]
pub struct EmitArgs {
    /// Component (logger name).
    pub component: String,

    /// Message text.
    pub message: String,

    /// Level name or rank.
    #[arg(short, long, default_value = "INFO")]
    pub level: String,

    /// Context entries; values that parse as JSON are stored as JSON.
    #[arg(short = 'x', long = "context", value_name = "KEY=VALUE")]
    pub context: Vec<String>,

    /// Append to the component's log file instead of the database.
    #[arg(long)]
    pub to_file: bool,
}

/// Splits a `KEY=VALUE` argument.
///
/// # Errors
///
/// Returns an error if there is no `=` or the key is empty.
pub fn split_pair<'a>(arg: &'a str, what: &str) -> Result<(&'a str, &'a str), CliError> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(CliError::InvalidArgument(format!(
            "{what} must look like KEY=VALUE, got '{arg}'"
        ))),
    }
}
