//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`logs`] - Paginated record listing
//! - [`stats`] - Level and component breakdown
//! - [`clear`] - Record deletion
//! - [`export`] - JSON, JSON-lines and CSV export
//! - [`collect`] - One-shot import, plus the `watch` loop
//! - [`emit`] - Store or append a single record

pub mod clear;
pub mod collect;
pub mod emit;
pub mod export;
pub mod logs;
pub mod stats;

pub use clear::ClearCommand;
pub use collect::{CollectCommand, WatchCommand};
pub use emit::EmitCommand;
pub use export::ExportCommand;
pub use logs::LogsCommand;
pub use stats::StatsCommand;
