//! Store behaviour across inserts, queries, aggregates and deletes.
//!
//! Covers id uniqueness under concurrent writers, stable pagination,
//! reserved-key rejection, aggregate consistency and message truncation.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use lama_logs::{
    DeleteScope, LogError, LogFilter, LogId, LogLevel, LogRecord, LogStore, PageRequest,
    RecordLimits, Sort, SortDirection, SortField,
};
use proptest::prelude::*;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

const BASE_EPOCH: i64 = 1_714_521_600; // 2024-05-01T00:00:00Z

fn at(offset_secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(BASE_EPOCH + offset_secs, 0).expect("valid timestamp")
}

fn record(level: LogLevel, component: &str, message: &str, offset_secs: i64) -> LogRecord {
    LogRecord::builder()
        .timestamp(at(offset_secs))
        .level(level)
        .logger_name(component)
        .message(message)
        .build(&RecordLimits::default())
        .expect("valid record")
}

fn memory_store() -> LogStore {
    LogStore::open_in_memory(RecordLimits::default()).expect("in-memory store")
}

fn level_strategy() -> impl Strategy<Value = LogLevel> {
    prop::sample::select(LogLevel::ALL.to_vec())
}

fn component_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["auth", "auth.tokens", "api", "worker"])
}

/// `(level, component, timestamp offset)`; offsets collide often so the
/// id tie-break is exercised.
fn rows_strategy() -> impl Strategy<Value = Vec<(LogLevel, &'static str, i64)>> {
    prop::collection::vec((level_strategy(), component_strategy(), 0i64..20), 0..40)
}

fn filter_strategy() -> impl Strategy<Value = LogFilter> {
    (
        prop::option::of(level_strategy()),
        prop::option::of(level_strategy()),
        prop::option::of(component_strategy()),
        any::<bool>(),
        prop::option::of(prop::sample::select(vec!["msg-1", "msg", "%", "_"])),
    )
        .prop_map(|(level, min_level, component, as_prefix, search)| {
            let mut filter = LogFilter::new();
            if let Some(level) = level {
                filter = filter.with_level(level);
            } else if let Some(min) = min_level {
                filter = filter.with_min_level(min);
            }
            if let Some(component) = component {
                filter = if as_prefix {
                    filter.with_component_prefix(component)
                } else {
                    filter.with_component(component)
                };
            }
            if let Some(search) = search {
                filter = filter.with_search(search);
            }
            filter
        })
}

fn seed(store: &LogStore, rows: &[(LogLevel, &str, i64)]) {
    for (i, (level, component, offset)) in rows.iter().enumerate() {
        store
            .insert(record(*level, component, &format!("msg-{i}"), *offset))
            .expect("insert");
    }
}

// ============================================================================
// Uniqueness
// ============================================================================

#[test]
fn concurrent_inserts_get_distinct_ids() {
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(
        LogStore::open(dir.path().join("loglama.db"), RecordLimits::default()).expect("store"),
    );

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..50)
                    .map(|i| {
                        store
                            .insert(record(LogLevel::Info, "worker", &format!("t{t}-{i}"), i))
                            .expect("insert")
                    })
                    .collect::<Vec<LogId>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().expect("writer thread") {
            assert!(id.is_assigned());
            assert!(seen.insert(id), "id {id:?} returned twice");
        }
    }
    assert_eq!(seen.len(), 200);
    assert_eq!(store.count(&LogFilter::new()).expect("count"), 200);
}

#[test]
fn ids_survive_reopen_and_are_not_reused_after_delete() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("loglama.db");

    let first = {
        let store = LogStore::open(&path, RecordLimits::default()).expect("store");
        let id = store.insert(record(LogLevel::Info, "api", "a", 0)).expect("insert");
        store.delete(&DeleteScope::All).expect("delete");
        id
    };

    let store = LogStore::open(&path, RecordLimits::default()).expect("reopen");
    let second = store.insert(record(LogLevel::Info, "api", "b", 1)).expect("insert");
    assert!(second.0 > first.0);
}

// ============================================================================
// Reserved keys and truncation
// ============================================================================

#[test]
fn reserved_context_key_is_rejected_without_insert() {
    let store = memory_store();

    let err = LogRecord::builder()
        .level(LogLevel::Info)
        .logger_name("api")
        .message("hello")
        .context("message", json!("shadow"))
        .build(&RecordLimits::default())
        .expect_err("reserved key");
    assert!(matches!(err, LogError::Validation(_)));

    let mut sneaky = record(LogLevel::Info, "api", "hello", 0);
    sneaky.context.insert("levelname".into(), json!("DEBUG"));
    assert!(store.insert(sneaky).expect_err("reserved key").is_validation());

    assert_eq!(store.count(&LogFilter::new()).expect("count"), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn long_messages_are_truncated_to_the_cap(message in "[a-zé😀 ]{0,120}") {
        const CAP: usize = 50;
        let store = LogStore::open_in_memory(RecordLimits::with_max_message_length(CAP))
            .expect("store");
        let mut rec = record(LogLevel::Info, "api", "", 0);
        rec.message.clone_from(&message);

        let id = store.insert(rec).expect("length alone never rejects");
        let stored = store.get(id).expect("get").expect("row exists");

        let expected: String = message.chars().take(CAP).collect();
        prop_assert_eq!(stored.message.chars().count(), message.chars().count().min(CAP));
        prop_assert_eq!(stored.message, expected);
    }
}

// ============================================================================
// Pagination and aggregates
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn pages_concatenate_to_the_full_result(
        rows in rows_strategy(),
        page_size in 1u32..8,
        field in prop::sample::select(vec![SortField::Timestamp, SortField::Level, SortField::Component]),
        ascending in any::<bool>(),
    ) {
        let store = memory_store();
        seed(&store, &rows);

        let direction = if ascending { SortDirection::Asc } else { SortDirection::Desc };
        let sort = Sort::new(field, direction);
        let filter = LogFilter::new();

        let expected: Vec<LogId> = store
            .query_all(&filter, sort)
            .expect("query all")
            .into_iter()
            .map(|r| r.id)
            .collect();

        let mut paged = Vec::new();
        let mut page = 1;
        loop {
            let result = store
                .query(&filter, sort, PageRequest::new(page, page_size))
                .expect("query page");
            prop_assert_eq!(result.total, expected.len() as u64);
            if result.rows.is_empty() {
                break;
            }
            paged.extend(result.rows.into_iter().map(|r| r.id));
            page += 1;
        }

        prop_assert_eq!(paged, expected);
    }

    #[test]
    fn aggregate_counts_agree_with_queries(rows in rows_strategy(), filter in filter_strategy()) {
        let store = memory_store();
        seed(&store, &rows);

        let aggregate = store.aggregate(&filter).expect("aggregate");
        let level_sum: u64 = aggregate.level_counts.values().sum();
        let component_sum: u64 = aggregate.component_counts.values().sum();
        let count = store.count(&filter).expect("count");
        let listed = store.query_all(&filter, Sort::default()).expect("query all");

        prop_assert_eq!(level_sum, aggregate.total);
        prop_assert_eq!(component_sum, aggregate.total);
        prop_assert_eq!(count, aggregate.total);
        prop_assert_eq!(listed.len() as u64, aggregate.total);
        prop_assert!(listed.iter().all(|r| r.matches(&filter)));
        prop_assert_eq!(aggregate.date_range.is_some(), aggregate.total > 0);
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn aggregate_by_component() {
    let store = memory_store();
    store.insert(record(LogLevel::Info, "auth", "login", 0)).expect("insert");
    store.insert(record(LogLevel::Error, "auth", "bad password", 1)).expect("insert");
    store.insert(record(LogLevel::Error, "auth", "locked", 2)).expect("insert");
    store.insert(record(LogLevel::Error, "api", "timeout", 3)).expect("insert");

    let aggregate = store
        .aggregate(&LogFilter::new().with_component("auth"))
        .expect("aggregate");

    assert_eq!(aggregate.total, 3);
    assert_eq!(aggregate.level_counts.len(), 2);
    assert_eq!(aggregate.level_counts[&LogLevel::Info], 1);
    assert_eq!(aggregate.level_counts[&LogLevel::Error], 2);
    let range = aggregate.date_range.expect("non-empty");
    assert_eq!(range.start, at(0));
    assert_eq!(range.end, at(2));
}

#[test]
fn warning_pages_are_newest_first_without_overlap() {
    let store = memory_store();
    let mut warnings = Vec::new();
    for i in 0..3 {
        warnings.push(
            store
                .insert(record(LogLevel::Warning, "api", &format!("w{i}"), i * 10))
                .expect("insert"),
        );
        store
            .insert(record(LogLevel::Info, "api", &format!("i{i}"), i * 10 + 1))
            .expect("insert");
    }

    let filter = LogFilter::new().with_level(LogLevel::Warning);
    let sort = Sort::new(SortField::Timestamp, SortDirection::Desc);
    let first = store.query(&filter, sort, PageRequest::new(1, 2)).expect("page 1");
    let second = store.query(&filter, sort, PageRequest::new(2, 2)).expect("page 2");

    assert_eq!(first.total, 3);
    assert_eq!(second.total, 3);
    let ids: Vec<LogId> = first.rows.iter().chain(&second.rows).map(|r| r.id).collect();
    warnings.reverse();
    assert_eq!(ids, warnings);
    assert!(first.rows.iter().chain(&second.rows).all(|r| r.level == LogLevel::Warning));
}

#[test]
fn delete_by_component_removes_only_that_component() {
    let store = memory_store();
    for i in 0..4 {
        store.insert(record(LogLevel::Info, "auth", "a", i)).expect("insert");
        store.insert(record(LogLevel::Info, "api", "b", i)).expect("insert");
    }
    store.insert(record(LogLevel::Info, "auth.tokens", "c", 9)).expect("insert");

    let before = store.count(&LogFilter::new()).expect("count");
    let deleted = store
        .delete(&DeleteScope::Matching(LogFilter::new().with_component("auth")))
        .expect("delete");
    let after = store.count(&LogFilter::new()).expect("count");

    assert_eq!(deleted, 4);
    assert_eq!(before - after, deleted);
    assert_eq!(store.components().expect("components"), vec!["api", "auth.tokens"]);
}
