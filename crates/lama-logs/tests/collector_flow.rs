//! Collector end-to-end flows: emit through the file writer, import with the
//! collector, read back through the query service.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lama_logs::{
    Collector, CollectorConfig, ComponentSource, JsonLinesWriter, ListRequest, LogFilter,
    LogLevel, LogStore, Logger, QueryService, RecordLimits, RecordSink, SourceState,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Helpers
// ============================================================================

fn line(second: u32, level: &str, message: &str) -> String {
    format!(
        r#"{{"timestamp":"2024-05-01T12:00:{second:02}Z","level":"{level}","logger_name":"billing","message":"{message}"}}"#
    )
}

fn append_lines(path: &Path, lines: &[String]) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("open log file");
    for l in lines {
        writeln!(file, "{l}").expect("append line");
    }
}

struct Harness {
    dir: TempDir,
    store: Arc<LogStore>,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store = Arc::new(
            LogStore::open(dir.path().join("loglama.db"), RecordLimits::default())
                .expect("open store"),
        );
        Self { dir, store }
    }

    fn log_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("logs")
    }

    fn total(&self) -> u64 {
        self.store.count(&LogFilter::new()).expect("count")
    }
}

// ============================================================================
// Incremental import
// ============================================================================

#[test]
fn appended_line_is_the_only_new_import() {
    let h = Harness::new();
    let path = h.dir.path().join("billing.log");
    append_lines(&path, &[line(0, "INFO", "invoice created"), line(1, "INFO", "invoice sent")]);

    let collector = Collector::new(Arc::clone(&h.store), CollectorConfig::default());
    collector
        .register(ComponentSource::json_lines("billing", &path))
        .expect("register");

    let first = collector.collect_once();
    assert_eq!(first.imported, 2);
    assert_eq!(h.total(), 2);

    append_lines(&path, &[line(2, "ERROR", "payment declined")]);
    let second = collector.collect_once();
    assert_eq!(second.imported, 1);
    assert_eq!(second.duplicates, 0);
    assert_eq!(h.total(), 3);
}

#[test]
fn unchanged_source_imports_nothing_on_rescan() {
    let h = Harness::new();
    let path = h.dir.path().join("billing.log");
    append_lines(&path, &(0..5).map(|i| line(i, "INFO", &format!("m{i}"))).collect::<Vec<_>>());

    let collector = Collector::new(Arc::clone(&h.store), CollectorConfig::default());
    collector
        .register(ComponentSource::json_lines("billing", &path))
        .expect("register");

    assert_eq!(collector.collect_once().imported, 5);
    let again = collector.collect_once();
    assert_eq!(again.imported, 0);
    assert_eq!(again.sources[0].state, SourceState::Idle);
    assert_eq!(h.total(), 5);
}

#[test]
fn marker_survives_a_new_collector_over_the_same_store() {
    let h = Harness::new();
    let path = h.dir.path().join("billing.log");
    append_lines(&path, &[line(0, "INFO", "a"), line(1, "INFO", "b")]);
    let source = ComponentSource::json_lines("billing", &path);

    {
        let collector = Collector::new(Arc::clone(&h.store), CollectorConfig::default());
        collector.register(source.clone()).expect("register");
        assert_eq!(collector.collect_once().imported, 2);
    }

    let reopened = Arc::new(
        LogStore::open(h.dir.path().join("loglama.db"), RecordLimits::default()).expect("reopen"),
    );
    let collector = Collector::new(Arc::clone(&reopened), CollectorConfig::default());
    collector.register(source).expect("register");
    let report = collector.collect_once();
    assert_eq!(report.imported, 0);
    assert_eq!(report.duplicates, 0);
}

#[test]
fn clearing_the_store_does_not_reimport_seen_lines() {
    let h = Harness::new();
    let path = h.dir.path().join("billing.log");
    append_lines(&path, &[line(0, "INFO", "a"), line(1, "INFO", "b")]);

    let collector = Collector::new(Arc::clone(&h.store), CollectorConfig::default());
    collector
        .register(ComponentSource::json_lines("billing", &path))
        .expect("register");
    collector.collect_once();

    h.store.delete(&lama_logs::DeleteScope::All).expect("clear");
    assert_eq!(collector.collect_once().imported, 0);
    assert_eq!(h.total(), 0);
}

#[test]
fn bad_lines_are_counted_and_skipped() {
    let h = Harness::new();
    let path = h.dir.path().join("billing.log");
    append_lines(
        &path,
        &[
            line(0, "INFO", "ok"),
            "{not json".to_string(),
            line(1, "WARNING", "still ok"),
        ],
    );

    let collector = Collector::new(Arc::clone(&h.store), CollectorConfig::default());
    collector
        .register(ComponentSource::json_lines("billing", &path))
        .expect("register");
    let report = collector.collect_once();

    assert_eq!(report.imported, 2);
    assert_eq!(report.parse_errors, 1);
    assert_eq!(report.failed_sources, 0);
}

#[test]
fn missing_file_fails_only_that_source() {
    let h = Harness::new();
    let good = h.dir.path().join("billing.log");
    append_lines(&good, &[line(0, "INFO", "a")]);

    let collector = Collector::new(Arc::clone(&h.store), CollectorConfig::default());
    let missing = ComponentSource::json_lines("ghost", h.dir.path().join("ghost.log"));
    collector.register(missing.clone()).expect("register");
    collector
        .register(ComponentSource::json_lines("billing", &good))
        .expect("register");

    let report = collector.collect_once();
    assert_eq!(report.failed_sources, 1);
    assert_eq!(report.imported, 1);
    assert_eq!(collector.state(&missing.key()), Some(SourceState::Failed));
    assert!(report.sources[0].error.is_some());
}

// ============================================================================
// Rotation
// ============================================================================

fn rotated(path: &Path, n: u32) -> std::path::PathBuf {
    lama_logs::rotated_path(path, n)
}

#[test]
fn rotation_to_a_larger_file_loses_nothing() {
    let h = Harness::new();
    let path = h.dir.path().join("billing.log");
    append_lines(&path, &[line(0, "INFO", "a"), line(1, "INFO", "b")]);

    let collector = Collector::new(Arc::clone(&h.store), CollectorConfig::default());
    let source = ComponentSource::json_lines("billing", &path);
    collector.register(source.clone()).expect("register");
    assert_eq!(collector.collect_once().imported, 2);

    std::fs::rename(&path, rotated(&path, 1)).expect("rotate");
    append_lines(
        &path,
        &[line(2, "INFO", "c"), line(3, "INFO", "d"), line(4, "INFO", "e")],
    );

    let report = collector.collect_once();
    assert_eq!(report.imported, 3);
    assert!(report.sources[0].rewound);
    assert_eq!(h.total(), 5);

    assert_eq!(collector.collect_once().imported, 0);
    assert_eq!(h.total(), 5);
}

#[test]
fn lines_written_just_before_rotation_are_imported() {
    let h = Harness::new();
    let path = h.dir.path().join("billing.log");
    append_lines(&path, &[line(0, "INFO", "a")]);

    let collector = Collector::new(Arc::clone(&h.store), CollectorConfig::default());
    collector
        .register(ComponentSource::json_lines("billing", &path))
        .expect("register");
    assert_eq!(collector.collect_once().imported, 1);

    append_lines(&path, &[line(1, "WARNING", "late"), line(2, "ERROR", "later")]);
    std::fs::rename(&path, rotated(&path, 1)).expect("rotate");
    append_lines(&path, &[line(3, "INFO", "fresh")]);

    let report = collector.collect_once();
    assert_eq!(report.imported, 3);
    assert_eq!(report.duplicates, 0);
    let messages: Vec<String> = h
        .store
        .query(
            &LogFilter::new(),
            lama_logs::Sort::default(),
            lama_logs::PageRequest::default(),
        )
        .expect("query")
        .rows
        .into_iter()
        .map(|r| r.message)
        .collect();
    for expected in ["a", "late", "later", "fresh"] {
        assert!(messages.iter().any(|m| m == expected), "missing {expected}");
    }
}

#[test]
fn rotating_writer_and_collector_agree() {
    let h = Harness::new();
    // One line per file: every write after the first rotates
    let writer = Arc::new(
        JsonLinesWriter::new(h.log_dir(), RecordLimits::default())
            .expect("writer")
            .with_rotation(1, 3),
    );
    let sink: Arc<dyn RecordSink> = writer;
    let logger = Logger::new("billing", Arc::clone(&sink));
    let collector = Collector::new(
        Arc::clone(&h.store),
        CollectorConfig::default().with_log_dir(h.log_dir()),
    );

    logger.info("invoice opened").expect("emit");
    assert_eq!(collector.collect_once().imported, 1);

    for batch in 0..3 {
        for i in 0..3 {
            logger.info(format!("invoice {batch}-{i}")).expect("emit");
        }
        sink.flush().expect("flush");
        let report = collector.collect_once();
        assert_eq!(report.imported, 3);
        assert!(report.sources[0].rewound);
    }

    let base = h.log_dir().join("billing.log");
    assert!(rotated(&base, 3).exists());
    assert!(!rotated(&base, 4).exists());
    assert_eq!(h.total(), 10);
}

// ============================================================================
// Emit -> collect -> query
// ============================================================================

#[test]
fn logger_output_round_trips_through_collector_and_query_service() {
    let h = Harness::new();
    let writer: Arc<dyn RecordSink> =
        Arc::new(JsonLinesWriter::new(h.log_dir(), RecordLimits::default()).expect("writer"));

    let auth = Logger::new("auth", Arc::clone(&writer));
    auth.info("login ok").expect("emit");
    auth.error("login failed").expect("emit");
    auth.error("account locked").expect("emit");
    Logger::new("api", Arc::clone(&writer))
        .warning("slow request")
        .expect("emit");
    writer.flush().expect("flush");

    let collector = Collector::new(
        Arc::clone(&h.store),
        CollectorConfig::default().with_log_dir(h.log_dir()),
    );
    let report = collector.collect_once();
    assert_eq!(report.sources.len(), 2);
    assert_eq!(report.imported, 4);

    let service = QueryService::new(Arc::clone(&h.store));
    let stats = service
        .stats(&ListRequest {
            component: Some("auth".into()),
            ..ListRequest::default()
        })
        .expect("stats");
    assert_eq!(stats.total, 3);

    let page = service
        .list_logs(&ListRequest {
            min_level: Some("warning".into()),
            page_size: Some(10),
            ..ListRequest::default()
        })
        .expect("list");
    assert_eq!(page.total, 3);
    assert!(page.rows.iter().all(|r| r.level.is_at_least(LogLevel::Warning)));
    assert!(page.rows.iter().all(|r| r.line_number.is_some()));
}

// ============================================================================
// Async passes and the background loop
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_pass_imports_every_discovered_source() {
    let h = Harness::new();
    let logs = h.log_dir();
    std::fs::create_dir_all(&logs).expect("mkdir");
    for name in ["a", "b", "c", "d", "e"] {
        append_lines(&logs.join(format!("{name}.log")), &[line(0, "INFO", name), line(1, "INFO", name)]);
    }

    let collector = Arc::new(Collector::new(
        Arc::clone(&h.store),
        CollectorConfig::default().with_log_dir(&logs),
    ));
    let report = collector.collect_once_async(&CancellationToken::new()).await;

    assert!(!report.cancelled);
    assert_eq!(report.sources.len(), 5);
    assert_eq!(report.imported, 10);
    let keys: Vec<&str> = report.sources.iter().map(|s| s.component.as_str()).collect();
    assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_pass_starts_no_sources() {
    let h = Harness::new();
    let path = h.dir.path().join("billing.log");
    append_lines(&path, &[line(0, "INFO", "a")]);

    let collector = Arc::new(Collector::new(Arc::clone(&h.store), CollectorConfig::default()));
    collector
        .register(ComponentSource::json_lines("billing", &path))
        .expect("register");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = collector.collect_once_async(&cancel).await;
    assert!(report.cancelled);
    assert!(report.sources.is_empty());
    assert_eq!(h.total(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn background_loop_picks_up_new_lines_and_stops_on_cancel() {
    let h = Harness::new();
    let path = h.dir.path().join("billing.log");
    append_lines(&path, &[line(0, "INFO", "first")]);

    let collector = Arc::new(Collector::new(
        Arc::clone(&h.store),
        CollectorConfig::default().with_interval(Duration::from_millis(50)),
    ));
    collector
        .register(ComponentSource::json_lines("billing", &path))
        .expect("register");

    let cancel = CancellationToken::new();
    let handle = Arc::clone(&collector).spawn(cancel.clone());

    let store = Arc::clone(&h.store);
    wait_for(|| store.count(&LogFilter::new()).expect("count") == 1).await;
    append_lines(&path, &[line(1, "INFO", "second")]);
    wait_for(|| store.count(&LogFilter::new()).expect("count") == 2).await;

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stops after cancel")
        .expect("loop task");
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}
