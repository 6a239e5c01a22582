//! Imports component log sources into the store.
//!
//! This module provides:
//! - [`Collector`] — Registry of [`ComponentSource`]s with one-shot and
//!   background import passes
//! - [`CollectorConfig`] — Interval, per-source time budget and batch size
//! - [`CollectReport`] / [`SourceReport`] — What a pass did, per source
//! - [`SourceState`] — `Unscanned → Scanning → Idle` (or `Failed`)
//!
//! Each source scan reads from the stored marker, imports the parsed
//! records with dedup, and advances the marker in the same store
//! transaction. A crash mid-scan re-reads the same entries next time and
//! dedup absorbs them. Scans of one source are mutually exclusive; a pass
//! that finds a source busy skips it rather than waiting.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{LogError, Result};
use crate::source::{
    ComponentSource, DEFAULT_MAX_ENTRIES_PER_SCAN, Marker, ScanBudget, reader_for,
};
use crate::store::LogStore;

/// Default time between background passes.
pub const DEFAULT_COLLECTOR_INTERVAL: Duration = Duration::from_secs(300);

/// Default wall-clock budget for one source scan.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra time the async pass waits past the scan budget before giving up
/// on a blocking scan.
const TIMEOUT_GRACE: Duration = Duration::from_secs(1);

/// Shortest background interval; a zero interval is raised to this.
pub const MIN_COLLECTOR_INTERVAL: Duration = Duration::from_millis(1);

/// File extensions picked up by [`Collector::discover`].
pub const DISCOVERED_EXTENSIONS: &[&str] = &["log", "jsonl"];

/// Collector tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Time between background passes
    pub interval: Duration,
    /// Wall-clock budget for a single source scan
    pub source_timeout: Duration,
    /// Entries read from one source per batch
    pub max_entries_per_scan: usize,
    /// Sources scanned at the same time in an async pass
    pub max_concurrent_sources: usize,
    /// Directory re-discovered at the start of every pass, if set
    pub log_dir: Option<PathBuf>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_COLLECTOR_INTERVAL,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            max_entries_per_scan: DEFAULT_MAX_ENTRIES_PER_SCAN,
            max_concurrent_sources: 4,
            log_dir: None,
        }
    }
}

impl CollectorConfig {
    /// Sets the background interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the per-source scan budget.
    #[must_use]
    pub const fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Sets the directory to discover sources in on each pass.
    #[must_use]
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    fn budget(&self) -> ScanBudget {
        ScanBudget {
            max_entries: self.max_entries_per_scan.max(1),
            ..ScanBudget::with_timeout(self.source_timeout)
        }
    }
}

/// Where a source is in its scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    /// Registered, never scanned
    Unscanned,
    /// A scan is in progress
    Scanning,
    /// Last scan succeeded
    Idle,
    /// Last scan failed; retried next pass
    Failed,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unscanned => "unscanned",
            Self::Scanning => "scanning",
            Self::Idle => "idle",
            Self::Failed => "failed",
        })
    }
}

/// Outcome of scanning one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    /// Source key
    pub key: String,
    /// Component the source belongs to
    pub component: String,
    /// State after the scan
    pub state: SourceState,
    /// Records newly stored
    pub imported: u64,
    /// Records already present
    pub duplicates: u64,
    /// Entries that could not be parsed
    pub parse_errors: u64,
    /// Records the store refused
    pub storage_errors: u64,
    /// Another scan of this source was running; nothing was done
    pub skipped_busy: bool,
    /// The file was rotated or truncated and re-read from the start
    pub rewound: bool,
    /// The failure may clear up on its own; the next pass tries again
    pub retryable: bool,
    /// Marker after the scan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<Marker>,
    /// Why the scan failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    fn new(source: &ComponentSource, state: SourceState) -> Self {
        Self {
            key: source.key(),
            component: source.component.clone(),
            state,
            imported: 0,
            duplicates: 0,
            parse_errors: 0,
            storage_errors: 0,
            skipped_busy: false,
            rewound: false,
            retryable: false,
            marker: None,
            error: None,
        }
    }

    fn failed(source: &ComponentSource, error: &LogError) -> Self {
        Self {
            error: Some(error.to_string()),
            retryable: error.is_retryable(),
            ..Self::new(source, SourceState::Failed)
        }
    }
}

/// Outcome of one pass over all sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectReport {
    /// Per-source results, in registration order
    pub sources: Vec<SourceReport>,
    /// Records newly stored across all sources
    pub imported: u64,
    /// Duplicates skipped across all sources
    pub duplicates: u64,
    /// Unparseable entries across all sources
    pub parse_errors: u64,
    /// Records the store refused across all sources
    pub storage_errors: u64,
    /// Sources whose scan failed
    pub failed_sources: u64,
    /// The pass stopped early because it was cancelled
    pub cancelled: bool,
}

impl CollectReport {
    fn push(&mut self, report: SourceReport) {
        self.imported += report.imported;
        self.duplicates += report.duplicates;
        self.parse_errors += report.parse_errors;
        self.storage_errors += report.storage_errors;
        if report.state == SourceState::Failed {
            self.failed_sources += 1;
        }
        self.sources.push(report);
    }

    fn sort(&mut self, order: &[String]) {
        self.sources.sort_by_key(|r| {
            order
                .iter()
                .position(|k| *k == r.key)
                .unwrap_or(usize::MAX)
        });
    }
}

struct SourceEntry {
    source: ComponentSource,
    state: Mutex<SourceState>,
    scan_lock: Mutex<()>,
}

impl SourceEntry {
    fn set_state(&self, state: SourceState) {
        *self.state.lock() = state;
    }
}

/// Discovers, tracks and imports component log sources.
pub struct Collector {
    store: Arc<LogStore>,
    config: CollectorConfig,
    sources: RwLock<Vec<Arc<SourceEntry>>>,
}

impl Collector {
    /// Creates a collector importing into `store`.
    #[must_use]
    pub fn new(store: Arc<LogStore>, config: CollectorConfig) -> Self {
        Self {
            store,
            config,
            sources: RwLock::new(Vec::new()),
        }
    }

    /// Collector configuration.
    #[must_use]
    pub const fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Registers a source. Returns false if one with the same key exists.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Validation`] if the source is malformed.
    pub fn register(&self, source: ComponentSource) -> Result<bool> {
        source.validate()?;
        let key = source.key();
        let mut sources = self.sources.write();
        if sources.iter().any(|e| e.source.key() == key) {
            return Ok(false);
        }
        tracing::info!(source = %key, component = %source.component, "registered log source");
        sources.push(Arc::new(SourceEntry {
            source,
            state: Mutex::new(SourceState::Unscanned),
            scan_lock: Mutex::new(()),
        }));
        Ok(true)
    }

    /// Removes a source. Its stored marker is kept.
    pub fn unregister(&self, key: &str) -> bool {
        let mut sources = self.sources.write();
        let before = sources.len();
        sources.retain(|e| e.source.key() != key);
        sources.len() != before
    }

    /// Registers every `*.log` / `*.jsonl` file in `log_dir` as a JSON-lines
    /// source named after its file stem. Returns how many were new.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::SourceUnavailable`] if the directory cannot be
    /// listed.
    pub fn discover(&self, log_dir: &Path) -> Result<usize> {
        let entries = std::fs::read_dir(log_dir).map_err(|e| LogError::SourceUnavailable {
            source_name: format!("dir:{}", log_dir.display()),
            reason: e.to_string(),
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.extension()
                    .and_then(OsStr::to_str)
                    .is_some_and(|ext| DISCOVERED_EXTENSIONS.contains(&ext))
            })
            .collect();
        files.sort();

        let mut added = 0;
        for path in files {
            let Some(component) = path.file_stem().and_then(OsStr::to_str) else {
                continue;
            };
            let component = component.to_string();
            if component.trim().is_empty() {
                continue;
            }
            if self.register(ComponentSource::json_lines(component, path))? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Registered sources, in registration order.
    #[must_use]
    pub fn sources(&self) -> Vec<ComponentSource> {
        self.sources
            .read()
            .iter()
            .map(|e| e.source.clone())
            .collect()
    }

    /// Current state of a source.
    #[must_use]
    pub fn state(&self, key: &str) -> Option<SourceState> {
        self.sources
            .read()
            .iter()
            .find(|e| e.source.key() == key)
            .map(|e| *e.state.lock())
    }

    /// Forgets a source's marker so its next scan starts from the beginning.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn reset(&self, key: &str) -> Result<bool> {
        self.store.reset_marker(key)
    }

    fn entries(&self) -> Vec<Arc<SourceEntry>> {
        self.sources.read().clone()
    }

    fn entry(&self, key: &str) -> Option<Arc<SourceEntry>> {
        self.sources
            .read()
            .iter()
            .find(|e| e.source.key() == key)
            .cloned()
    }

    fn rediscover(&self) {
        if let Some(dir) = &self.config.log_dir {
            if let Err(e) = self.discover(dir) {
                tracing::warn!(dir = %dir.display(), error = %e, "log directory discovery failed");
            }
        }
    }

    /// Scans one registered source now, on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Validation`] if no source has this key. Scan
    /// failures are reported in the [`SourceReport`], not returned.
    pub fn collect_source(&self, key: &str) -> Result<SourceReport> {
        let entry = self
            .entry(key)
            .ok_or_else(|| LogError::validation(format!("no registered source '{key}'")))?;
        Ok(self.scan_entry(&entry, self.config.budget()))
    }

    /// Runs one pass over every source, sequentially, on the calling thread.
    pub fn collect_once(&self) -> CollectReport {
        self.rediscover();
        let mut report = CollectReport::default();
        for entry in self.entries() {
            report.push(self.scan_entry(&entry, self.config.budget()));
        }
        log_pass(&report);
        report
    }

    /// Runs one pass with sources scanned concurrently on the blocking pool.
    ///
    /// Each scan is bounded by the configured time budget. Cancellation is
    /// checked before each source starts; scans already running finish.
    pub async fn collect_once_async(self: &Arc<Self>, cancel: &CancellationToken) -> CollectReport {
        self.rediscover();
        let entries = self.entries();
        let order: Vec<String> = entries.iter().map(|e| e.source.key()).collect();
        let limit = self.config.max_concurrent_sources.max(1);

        let mut report = CollectReport::default();
        let mut pending = entries.into_iter();
        let mut set = JoinSet::new();

        loop {
            while !report.cancelled && set.len() < limit {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                let Some(entry) = pending.next() else { break };
                set.spawn(Arc::clone(self).scan_bounded(entry));
            }
            let Some(joined) = set.join_next().await else {
                break;
            };
            match joined {
                Ok(source_report) => report.push(source_report),
                Err(e) => tracing::error!(error = %e, "source scan task failed"),
            }
        }

        report.sort(&order);
        log_pass(&report);
        report
    }

    async fn scan_bounded(self: Arc<Self>, entry: Arc<SourceEntry>) -> SourceReport {
        let budget = self.config.budget();
        let limit = self.config.source_timeout + TIMEOUT_GRACE;
        let scan = {
            let entry = Arc::clone(&entry);
            tokio::task::spawn_blocking(move || self.scan_entry(&entry, budget))
        };
        match time::timeout(limit, scan).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                let err = LogError::SourceUnavailable {
                    source_name: entry.source.key(),
                    reason: format!("scan task failed: {e}"),
                };
                SourceReport::failed(&entry.source, &err)
            }
            Err(_) => {
                let err = LogError::Timeout {
                    source_name: entry.source.key(),
                };
                tracing::warn!(source = %entry.source.key(), error = %err, "abandoning scan");
                SourceReport::failed(&entry.source, &err)
            }
        }
    }

    /// Starts the background loop. It runs a pass every interval until
    /// `cancel` fires; missed ticks are skipped rather than bunched up.
    /// Intervals below [`MIN_COLLECTOR_INTERVAL`] are raised to it.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let period = self.config.interval.max(MIN_COLLECTOR_INTERVAL);
        tokio::spawn(async move {
            tracing::info!(interval = ?period, "collector started");
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        self.collect_once_async(&cancel).await;
                    }
                }
            }
            tracing::info!("collector stopped");
        })
    }

    fn scan_entry(&self, entry: &SourceEntry, budget: ScanBudget) -> SourceReport {
        let Some(_guard) = entry.scan_lock.try_lock() else {
            tracing::debug!(source = %entry.source.key(), "scan already running, skipping");
            return SourceReport {
                skipped_busy: true,
                ..SourceReport::new(&entry.source, SourceState::Scanning)
            };
        };

        entry.set_state(SourceState::Scanning);
        let mut report = SourceReport::new(&entry.source, SourceState::Scanning);
        match self.scan_locked(&entry.source, budget, &mut report) {
            Ok(()) => {
                report.state = SourceState::Idle;
                tracing::debug!(
                    source = %report.key,
                    imported = report.imported,
                    duplicates = report.duplicates,
                    parse_errors = report.parse_errors,
                    "scanned source"
                );
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(source = %report.key, error = %e, "source scan failed, retrying next pass");
                } else {
                    tracing::error!(
                        source = %report.key,
                        error = %e,
                        "source scan failed and needs attention before it can succeed"
                    );
                }
                report.state = SourceState::Failed;
                report.retryable = e.is_retryable();
                report.error = Some(e.to_string());
            }
        }
        entry.set_state(report.state);
        report
    }

    /// Reads and imports batches until the source is drained. Each batch is
    /// committed with its marker, so a failure keeps earlier batches.
    fn scan_locked(
        &self,
        source: &ComponentSource,
        budget: ScanBudget,
        report: &mut SourceReport,
    ) -> Result<()> {
        let key = source.key();
        let reader = reader_for(&source.kind);
        let mut marker = self.store.load_marker(&key)?;

        loop {
            let outcome = reader.read(source, marker, &budget)?;
            report.parse_errors += outcome.parse_errors;
            report.rewound |= outcome.rewound;

            if outcome.records.is_empty() && marker == Some(outcome.next_marker) {
                break;
            }
            let batch = self.store.import_batch(
                &key,
                &source.component,
                outcome.records,
                outcome.next_marker,
            )?;
            report.imported += batch.inserted;
            report.duplicates += batch.duplicates;
            report.storage_errors += batch.failed;
            marker = Some(outcome.next_marker);
            report.marker = marker;

            if !outcome.more {
                break;
            }
        }
        report.marker = marker;
        Ok(())
    }
}

fn log_pass(report: &CollectReport) {
    tracing::info!(
        sources = report.sources.len(),
        imported = report.imported,
        duplicates = report.duplicates,
        parse_errors = report.parse_errors,
        storage_errors = report.storage_errors,
        failed = report.failed_sources,
        cancelled = report.cancelled,
        "collector pass finished"
    );
}
