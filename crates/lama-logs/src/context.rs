//! Ambient key/value context merged into records at emission time.
//!
//! Two kinds of scope exist:
//!
//! - Synchronous scopes use a per-thread frame stack. [`with_context`]
//!   pushes a frame and returns a [`ContextGuard`]; dropping the guard
//!   (including during a panic unwind) restores the previous frame.
//! - Asynchronous scopes use a tokio task-local. [`scope_async`] wraps a
//!   future so every poll of it sees the merged frame, whichever worker
//!   thread it runs on.
//!
//! Inner scopes override outer ones on key collision. Frames are never
//! shared between threads or tasks, so concurrent flows cannot observe each
//! other's keys.
//!
//! ```rust
//! use lama_logs::context::{current_context, with_context};
//! use serde_json::json;
//!
//! let _outer = with_context([("request_id", json!("r-1"))]).unwrap();
//! {
//!     let _inner = with_context([("user", json!("alice"))]).unwrap();
//!     assert_eq!(current_context().len(), 2);
//! }
//! assert_eq!(current_context().len(), 1);
//! ```

use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::types::{ContextMap, validate_context_keys};

/// A task-scope frame. `id` lets thread frames tell which task pushed them.
#[derive(Debug, Clone)]
struct TaskFrame {
    id: u64,
    values: Arc<ContextMap>,
}

#[derive(Debug)]
struct ThreadFrame {
    /// Task frame that was active when this frame was pushed.
    owner: Option<u64>,
    values: Arc<ContextMap>,
}

static NEXT_TASK_FRAME: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static STACK: RefCell<Vec<ThreadFrame>> = const { RefCell::new(Vec::new()) };
}

tokio::task_local! {
    static TASK_FRAME: TaskFrame;
}

fn task_frame() -> Option<TaskFrame> {
    TASK_FRAME.try_with(Clone::clone).ok()
}

/// Returns the effective merged context visible to the caller right now.
#[must_use]
pub fn current_context() -> ContextMap {
    current_arc().as_ref().clone()
}

fn current_arc() -> Arc<ContextMap> {
    let task = task_frame();
    let owner = task.as_ref().map(|t| t.id);
    let from_thread = STACK.with(|stack| {
        stack
            .borrow()
            .last()
            .filter(|top| top.owner == owner)
            .map(|top| Arc::clone(&top.values))
    });
    from_thread
        .or_else(|| task.map(|t| t.values))
        .unwrap_or_default()
}

fn merged<K, I>(values: I) -> Result<ContextMap>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, serde_json::Value)>,
{
    let mut merged = current_context();
    let mut added = ContextMap::new();
    for (k, v) in values {
        added.insert(k.into(), v);
    }
    validate_context_keys(&added)?;
    merged.extend(added);
    Ok(merged)
}

/// RAII handle for a synchronous context scope.
///
/// Not `Send`: a guard must be dropped on the thread that created it, which
/// also keeps it from being held across an `.await` in a spawned task.
#[derive(Debug)]
#[must_use = "the context is popped as soon as the guard is dropped"]
pub struct ContextGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        STACK.with(|stack| stack.borrow_mut().truncate(self.depth));
    }
}

/// Pushes a context frame for the current thread.
///
/// # Errors
///
/// Returns a validation error if any key is a reserved record field; no
/// frame is pushed in that case.
pub fn with_context<K, I>(values: I) -> Result<ContextGuard>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, serde_json::Value)>,
{
    let values = Arc::new(merged(values)?);
    let owner = task_frame().map(|t| t.id);
    let depth = STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let depth = stack.len();
        stack.push(ThreadFrame { owner, values });
        depth
    });
    Ok(ContextGuard {
        depth,
        _not_send: PhantomData,
    })
}

/// Runs `f` inside a context scope and returns its result.
///
/// # Errors
///
/// Returns a validation error if any key is reserved; `f` is not run.
pub fn capture_context<K, I, F, R>(values: I, f: F) -> Result<R>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, serde_json::Value)>,
    F: FnOnce() -> R,
{
    let _guard = with_context(values)?;
    Ok(f())
}

/// Runs `fut` with a task-scoped context frame.
///
/// The frame is the caller's current context merged with `values`, so a
/// spawned task that is wrapped in `scope_async` inherits what its parent
/// saw when the scope was created.
///
/// # Errors
///
/// Returns a validation error if any key is reserved; `fut` is not polled.
pub async fn scope_async<K, I, F>(values: I, fut: F) -> Result<F::Output>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, serde_json::Value)>,
    F: Future,
{
    let frame = TaskFrame {
        id: NEXT_TASK_FRAME.fetch_add(1, Ordering::Relaxed),
        values: Arc::new(merged(values)?),
    };
    Ok(TASK_FRAME.scope(frame, fut).await)
}

/// Drops every synchronous frame on the current thread.
pub fn clear_context() {
    STACK.with(|stack| stack.borrow_mut().clear());
}
