//! Destinations for emitted records.
//!
//! [`RecordSink`] abstracts over where a [`Logger`](crate::logger::Logger)
//! sends its records: straight into the [`LogStore`](crate::store::LogStore)
//! or into a per-component JSON-lines file that the collector imports later.
//! [`TeeSink`] and [`BufferedSink`] wrap other sinks.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{LogError, Result};
use crate::types::{LogId, LogLevel, LogRecord};

/// Records a [`BufferedSink`] holds by default before draining.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// Trait for record destinations.
pub trait RecordSink: Send + Sync {
    /// Writes one record.
    ///
    /// Returns the store-assigned id when the sink persists to the store
    /// directly, `None` when the id is assigned later (file sinks).
    ///
    /// # Errors
    ///
    /// Returns an error if the record is invalid or cannot be written.
    fn emit(&self, record: LogRecord) -> Result<Option<LogId>>;

    /// Flushes buffered output, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Arc<S> {
    fn emit(&self, record: LogRecord) -> Result<Option<LogId>> {
        (**self).emit(record)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}

/// Fans one record out to several sinks.
///
/// Returns the first store-assigned id; the first error aborts the fan-out.
pub struct TeeSink {
    sinks: Vec<Arc<dyn RecordSink>>,
}

impl TeeSink {
    /// Creates a tee over the given sinks.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn RecordSink>>) -> Self {
        Self { sinks }
    }
}

impl RecordSink for TeeSink {
    fn emit(&self, record: LogRecord) -> Result<Option<LogId>> {
        let mut assigned = None;
        for sink in &self.sinks {
            let id = sink.emit(record.clone())?;
            assigned = assigned.or(id);
        }
        Ok(assigned)
    }

    fn flush(&self) -> Result<()> {
        self.sinks.iter().try_for_each(|s| s.flush())
    }
}

/// Holds records in memory and hands them to an inner sink in bursts.
///
/// The buffer drains when it reaches its capacity, when a record at or above
/// the flush level arrives (`ERROR` by default), on [`RecordSink::flush`]
/// and on drop. A record that only lands in the buffer gets no id.
pub struct BufferedSink {
    inner: Arc<dyn RecordSink>,
    capacity: usize,
    flush_level: LogLevel,
    buffer: Mutex<Vec<LogRecord>>,
}

impl BufferedSink {
    /// Buffers up to `capacity` records (at least one) for `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn RecordSink>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner,
            capacity,
            flush_level: LogLevel::Error,
            buffer: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Sets the level that forces an immediate drain.
    #[must_use]
    pub const fn with_flush_level(mut self, level: LogLevel) -> Self {
        self.flush_level = level;
        self
    }

    /// Records waiting in the buffer.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Hands every buffered record to the inner sink, in order.
    ///
    /// A failing record does not hold back the ones after it; the first
    /// error is returned once all were tried.
    fn drain(&self, buffer: &mut Vec<LogRecord>) -> Result<Option<LogId>> {
        let mut last_id = None;
        let mut first_err: Option<LogError> = None;
        for record in buffer.drain(..) {
            match self.inner.emit(record) {
                Ok(id) => last_id = id.or(last_id),
                Err(e) => {
                    tracing::warn!(error = %e, "buffered record rejected by inner sink");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(last_id),
        }
    }
}

impl RecordSink for BufferedSink {
    fn emit(&self, record: LogRecord) -> Result<Option<LogId>> {
        let urgent = record.level.is_at_least(self.flush_level);
        let mut buffer = self.buffer.lock();
        buffer.push(record);
        if !urgent && buffer.len() < self.capacity {
            return Ok(None);
        }
        self.drain(&mut buffer)
    }

    fn flush(&self) -> Result<()> {
        let mut buffer = self.buffer.lock();
        self.drain(&mut buffer)?;
        self.inner.flush()
    }
}

impl Drop for BufferedSink {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "failed to drain buffered records on drop");
        }
    }
}
