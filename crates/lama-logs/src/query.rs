//! Request-shaped reads over the store.
//!
//! [`QueryService`] takes the loosely typed requests a CLI, web view or API
//! receives ([`ListRequest`]: every filter is an optional string), validates
//! them into a [`LogFilter`], [`Sort`] and [`PageRequest`], and shapes the
//! store's answer into a [`Page`] or [`Stats`]. An empty result is an empty
//! page, never an error.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LogError, Result};
use crate::store::{DateRange, LogStore};
use crate::types::{
    DEFAULT_PAGE_SIZE, LogFilter, LogId, LogLevel, LogRecord, MAX_PAGE_SIZE, PageRequest, Sort,
    SortDirection, SortField, TimeRange, parse_timestamp,
};

/// Filter, sort and page parameters as received from a caller.
///
/// Blank strings count as absent, so HTML form submissions work unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListRequest {
    /// Exact level name or rank
    pub level: Option<String>,
    /// Minimum level name or rank
    pub min_level: Option<String>,
    /// Exact component
    pub component: Option<String>,
    /// Component and its dotted children
    pub component_prefix: Option<String>,
    /// Case-insensitive message substring
    pub search: Option<String>,
    /// Inclusive start, RFC 3339 or `YYYY-MM-DD[ HH:MM:SS]`
    pub start_date: Option<String>,
    /// Inclusive end; a bare date covers the whole day
    pub end_date: Option<String>,
    /// One-based page number
    pub page: Option<u32>,
    /// Rows per page
    pub page_size: Option<u32>,
    /// Sort column
    pub sort_by: Option<String>,
    /// `asc` or `desc`
    pub sort_dir: Option<String>,
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn parse_bound(field: &str, value: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Some(ts) = parse_timestamp(value) {
        return Ok(ts);
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        LogError::validation(format!(
            "{field} '{value}' is not RFC 3339 or YYYY-MM-DD[ HH:MM:SS]"
        ))
    })?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    };
    time.map(|t| date.and_time(t).and_utc())
        .ok_or_else(|| LogError::validation(format!("{field} '{value}' is out of range")))
}

impl ListRequest {
    /// Builds the store filter.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Validation`] for an unknown level, an unreadable
    /// or inverted date range, or conflicting exact/prefix fields.
    pub fn filter(&self) -> Result<LogFilter> {
        let mut filter = LogFilter::new();

        match (present(self.level.as_ref()), present(self.min_level.as_ref())) {
            (Some(_), Some(_)) => {
                return Err(LogError::validation("level and min_level are mutually exclusive"));
            }
            (Some(level), None) => filter = filter.with_level(level.parse::<LogLevel>()?),
            (None, Some(level)) => filter = filter.with_min_level(level.parse::<LogLevel>()?),
            (None, None) => {}
        }

        match (
            present(self.component.as_ref()),
            present(self.component_prefix.as_ref()),
        ) {
            (Some(_), Some(_)) => {
                return Err(LogError::validation(
                    "component and component_prefix are mutually exclusive",
                ));
            }
            (Some(c), None) => filter = filter.with_component(c),
            (None, Some(p)) => filter = filter.with_component_prefix(p),
            (None, None) => {}
        }

        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            filter = filter.with_search(search);
        }

        let start = present(self.start_date.as_ref())
            .map(|s| parse_bound("start_date", s, false))
            .transpose()?;
        let end = present(self.end_date.as_ref())
            .map(|s| parse_bound("end_date", s, true))
            .transpose()?;
        filter = filter.with_time_range(TimeRange::new(start, end));

        filter.validate()?;
        Ok(filter)
    }

    /// Builds the sort, defaulting to newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Validation`] for an unknown column or direction.
    pub fn sort(&self) -> Result<Sort> {
        let field = present(self.sort_by.as_ref())
            .map(str::parse::<SortField>)
            .transpose()?
            .unwrap_or_default();
        let direction = present(self.sort_dir.as_ref())
            .map(str::parse::<SortDirection>)
            .transpose()?
            .unwrap_or_default();
        Ok(Sort::new(field, direction))
    }
}

/// One page of records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// Records on this page
    pub rows: Vec<LogRecord>,
    /// Records matching the filter
    pub total: u64,
    /// One-based page number
    pub page: u32,
    /// Rows per page
    pub page_size: u32,
    /// Number of pages for `total`
    pub total_pages: u64,
    /// A later page exists
    pub has_next: bool,
    /// An earlier page exists
    pub has_prev: bool,
}

impl Page {
    fn new(rows: Vec<LogRecord>, total: u64, request: PageRequest) -> Self {
        let total_pages = total.div_ceil(u64::from(request.page_size));
        Self {
            rows,
            total,
            page: request.page,
            page_size: request.page_size,
            total_pages,
            has_next: u64::from(request.page) < total_pages,
            has_prev: request.page > 1,
        }
    }
}

/// Count for one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelCount {
    /// Level
    pub level: LogLevel,
    /// Matching records
    pub count: u64,
}

/// Count for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentCount {
    /// Component name
    pub component: String,
    /// Matching records
    pub count: u64,
}

/// Breakdown of a filtered result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Levels present, least to most severe
    pub level_counts: Vec<LevelCount>,
    /// Components, most records first
    pub component_counts: Vec<ComponentCount>,
    /// Oldest and newest timestamps, if any record matches
    pub date_range: Option<DateRange>,
    /// Records matching the filter
    pub total: u64,
}

/// Validates requests and answers them from the store.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<LogStore>,
    default_page_size: u32,
    max_page_size: u32,
}

impl QueryService {
    /// Creates a service with the default page sizes.
    #[must_use]
    pub fn new(store: Arc<LogStore>) -> Self {
        Self {
            store,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    /// Overrides the page sizes; the maximum never exceeds [`MAX_PAGE_SIZE`].
    #[must_use]
    pub fn with_page_sizes(mut self, default_page_size: u32, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size.clamp(1, MAX_PAGE_SIZE);
        self.default_page_size = default_page_size.clamp(1, self.max_page_size);
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    fn page_request(&self, request: &ListRequest) -> PageRequest {
        let size = request
            .page_size
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size);
        PageRequest::new(request.page.unwrap_or(1), size)
    }

    /// Returns one page of records for the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error before touching the store, or a storage
    /// error.
    pub fn list_logs(&self, request: &ListRequest) -> Result<Page> {
        let filter = request.filter()?;
        let sort = request.sort()?;
        let page = self.page_request(request);
        let result = self.store.query(&filter, sort, page)?;
        Ok(Page::new(result.rows, result.total, page))
    }

    /// Returns level/component breakdowns for the request's filter.
    /// Paging and sort fields are ignored.
    ///
    /// # Errors
    ///
    /// Returns a validation or storage error.
    pub fn stats(&self, request: &ListRequest) -> Result<Stats> {
        let filter = request.filter()?;
        let aggregate = self.store.aggregate(&filter)?;

        let level_counts = aggregate
            .level_counts
            .into_iter()
            .map(|(level, count)| LevelCount { level, count })
            .collect();
        let mut component_counts: Vec<ComponentCount> = aggregate
            .component_counts
            .into_iter()
            .map(|(component, count)| ComponentCount { component, count })
            .collect();
        component_counts.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.component.cmp(&b.component))
        });

        Ok(Stats {
            level_counts,
            component_counts,
            date_range: aggregate.date_range,
            total: aggregate.total,
        })
    }

    /// Fetches one record.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get(&self, id: LogId) -> Result<Option<LogRecord>> {
        self.store.get(id)
    }

    /// Distinct component names for filter drop-downs.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn components(&self) -> Result<Vec<String>> {
        self.store.components()
    }

    /// Levels that have records.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn levels(&self) -> Result<Vec<LogLevel>> {
        self.store.levels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordLimits;
    use test_case::test_case;

    fn service() -> QueryService {
        let store = LogStore::open_in_memory(RecordLimits::default()).expect("store");
        QueryService::new(Arc::new(store))
    }

    fn seed(svc: &QueryService, level: LogLevel, component: &str, message: &str, ts: &str) {
        let record = LogRecord::builder()
            .timestamp(parse_timestamp(ts).expect("timestamp"))
            .level(level)
            .logger_name(component)
            .message(message)
            .build(&RecordLimits::default())
            .expect("record");
        svc.store().insert(record).expect("insert");
    }

    fn request() -> ListRequest {
        ListRequest::default()
    }

    #[test]
    fn empty_store_gives_empty_page() {
        let svc = service();
        let page = svc.list_logs(&request()).expect("list");
        assert!(page.rows.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next);
        assert!(!page.has_prev);
    }

    #[test]
    fn page_flags_and_counts() {
        let svc = service();
        for i in 0..5 {
            seed(&svc, LogLevel::Info, "app", &format!("m{i}"), &format!("2024-01-01 00:00:0{i}"));
        }
        let page = svc
            .list_logs(&ListRequest {
                page: Some(2),
                page_size: Some(2),
                ..request()
            })
            .expect("list");
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
        assert!(page.has_prev);
        assert_eq!(page.rows[0].message, "m2");
    }

    #[test]
    fn page_size_is_capped() {
        let svc = service().with_page_sizes(10, 20);
        let page = svc
            .list_logs(&ListRequest {
                page_size: Some(10_000),
                ..request()
            })
            .expect("list");
        assert_eq!(page.page_size, 20);
        let page = svc.list_logs(&request()).expect("list");
        assert_eq!(page.page_size, 10);
    }

    #[test]
    fn bare_end_date_covers_whole_day() {
        let svc = service();
        seed(&svc, LogLevel::Info, "app", "late", "2024-01-01 23:59:59");
        seed(&svc, LogLevel::Info, "app", "next day", "2024-01-02 00:00:00");
        let page = svc
            .list_logs(&ListRequest {
                start_date: Some("2024-01-01".into()),
                end_date: Some("2024-01-01".into()),
                ..request()
            })
            .expect("list");
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].message, "late");
    }

    #[test]
    fn blank_fields_are_ignored() {
        let req = ListRequest {
            level: Some(String::new()),
            component: Some("  ".into()),
            start_date: Some(String::new()),
            ..request()
        };
        assert_eq!(req.filter().expect("filter"), LogFilter::new());
    }

    #[test_case(ListRequest { level: Some("LOUD".into()), ..ListRequest::default() } ; "unknown level")]
    #[test_case(ListRequest { start_date: Some("soon".into()), ..ListRequest::default() } ; "bad date")]
    #[test_case(ListRequest { start_date: Some("2024-02-01".into()), end_date: Some("2024-01-01".into()), ..ListRequest::default() } ; "inverted range")]
    #[test_case(ListRequest { level: Some("INFO".into()), min_level: Some("ERROR".into()), ..ListRequest::default() } ; "level conflict")]
    #[test_case(ListRequest { component: Some("a".into()), component_prefix: Some("a".into()), ..ListRequest::default() } ; "component conflict")]
    #[test_case(ListRequest { sort_by: Some("password".into()), ..ListRequest::default() } ; "bad sort column")]
    fn malformed_requests_are_rejected(req: ListRequest) {
        let svc = service();
        let err = svc.list_logs(&req).expect_err("malformed");
        assert!(err.is_validation());
    }

    #[test]
    fn stats_orders_levels_and_components() {
        let svc = service();
        seed(&svc, LogLevel::Error, "db", "a", "2024-01-01 00:00:01");
        seed(&svc, LogLevel::Info, "auth", "b", "2024-01-01 00:00:02");
        seed(&svc, LogLevel::Info, "auth", "c", "2024-01-01 00:00:03");
        seed(&svc, LogLevel::Debug, "auth", "d", "2024-01-01 00:00:04");

        let stats = svc.stats(&request()).expect("stats");
        let levels: Vec<LogLevel> = stats.level_counts.iter().map(|c| c.level).collect();
        assert_eq!(levels, vec![LogLevel::Debug, LogLevel::Info, LogLevel::Error]);
        assert_eq!(stats.component_counts[0].component, "auth");
        assert_eq!(stats.component_counts[0].count, 3);
        assert_eq!(stats.total, 4);
        let range = stats.date_range.expect("range");
        assert!(range.start < range.end);
    }

    #[test]
    fn stats_of_nothing_is_empty() {
        let svc = service();
        let stats = svc
            .stats(&ListRequest {
                component: Some("nobody".into()),
                ..request()
            })
            .expect("stats");
        assert_eq!(stats.total, 0);
        assert!(stats.level_counts.is_empty());
        assert!(stats.date_range.is_none());
    }

    #[test]
    fn request_deserializes_from_json() {
        let req: ListRequest =
            serde_json::from_str(r#"{"min_level":"warning","page":3}"#).expect("deserialize");
        assert_eq!(req.min_level.as_deref(), Some("warning"));
        assert_eq!(req.page, Some(3));
        assert!(req.sort().expect("sort") == Sort::default());
    }
}
