//! Request-scoped execution context.
//!
//! A [`ContextTracker`] owns a registry of live units of work, each identified
//! by a [`TaskHandle`] issued when the unit is entered. The handle of the unit
//! currently being polled lives in a tokio task-local, so any code running
//! inside the unit, at any depth and across `.await` points, can look up the
//! [`ContextRecord`] attached to it.
//!
//! Lifecycle of a record:
//!
//! 1. The HTTP entry middleware opens a unit with [`ContextTracker::scope`] and
//!    calls [`create_context`] before anything else runs.
//! 2. Every unit spawned from inside it ([`ContextTracker::spawn`], [`spawn`])
//!    receives a copy of the parent's record before its first poll.
//! 3. When a unit's future completes or is dropped, its registry entry is
//!    removed. Handles are never reused, so a later unit can not observe a
//!    stale record.
//!
//! ```rust,ignore
//! let tracker = ContextTracker::new();
//! tracker
//!     .scope(async {
//!         create_context(RequestMetadata::new("GET", "/a"))?;
//!         let child = reqtrail::context::spawn(async { correlation_id() });
//!         assert_eq!(child.await.unwrap()?, correlation_id()?);
//!         Ok::<_, ContextError>(())
//!     })
//!     .await?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::errors::ContextError;
use crate::types::{CorrelationId, TaskHandle};

tokio::task_local! {
    static CURRENT_UNIT: TrackedUnit;
}

/// What the HTTP layer knows about a request when its context is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Original request target, path and query string included
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Path parameters captured by the router
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Decoded query string
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Decoded JSON body, `null` when absent or not JSON
    #[serde(default)]
    pub body: Value,
}

impl RequestMetadata {
    /// Creates metadata for a request with no parameters and no body.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            ..Self::default()
        }
    }

    /// Adds a path parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Sets the decoded body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

/// The per-request record retrievable from any unit descending from the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRecord {
    /// Request metadata captured at creation
    #[serde(flatten)]
    pub request: RequestMetadata,
    /// Correlation id assigned at creation
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Default)]
struct Registry {
    next_handle: AtomicU64,
    // Every live unit has an entry; the record is absent until a context is
    // created on it or inherited from its parent.
    units: RwLock<HashMap<TaskHandle, Option<Arc<ContextRecord>>>>,
}

impl Registry {
    fn enter(self: &Arc<Self>, inherited: Option<Arc<ContextRecord>>) -> TrackedUnit {
        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = TaskHandle::from_raw(raw);
        self.units.write().insert(handle, inherited);
        TrackedUnit {
            handle,
            registry: Arc::clone(self),
        }
    }

    fn record(&self, handle: TaskHandle) -> Option<Arc<ContextRecord>> {
        self.units.read().get(&handle).cloned().flatten()
    }

    fn attach(&self, handle: TaskHandle, record: Arc<ContextRecord>) -> Result<(), ContextError> {
        let mut units = self.units.write();
        let slot = units
            .get_mut(&handle)
            .ok_or(ContextError::UnitFinished(handle))?;
        *slot = Some(record);
        Ok(())
    }

    fn release(&self, handle: TaskHandle) {
        self.units.write().remove(&handle);
    }
}

#[derive(Debug, Clone)]
struct TrackedUnit {
    handle: TaskHandle,
    registry: Arc<Registry>,
}

/// Removes the unit's registry entry when the unit's future is done with,
/// whether it completed, panicked or was dropped unpolled.
struct UnitGuard(TrackedUnit);

impl Drop for UnitGuard {
    fn drop(&mut self) {
        self.0.registry.release(self.0.handle);
    }
}

fn run_in_unit<F>(unit: TrackedUnit, future: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let guard = UnitGuard(unit.clone());
    CURRENT_UNIT.scope(unit, async move {
        let _guard = guard;
        future.await
    })
}

/// Issues task handles and owns the handle -> record registry.
///
/// Cloning a tracker is cheap and every clone shares the same registry.
#[derive(Debug, Clone, Default)]
pub struct ContextTracker {
    registry: Arc<Registry>,
}

impl ContextTracker {
    /// Creates a tracker with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `future` as a new tracked unit on the current task.
    ///
    /// The unit is registered immediately and inherits the caller's record,
    /// if the caller has one. It is released once the returned future
    /// completes or is dropped.
    pub fn scope<F>(&self, future: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        let unit = self.registry.enter(get_context());
        run_in_unit(unit, future)
    }

    /// Spawns `future` onto the tokio runtime as a new tracked unit that
    /// inherits the caller's record.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(self.scope(future))
    }

    /// Number of live units that currently hold a record.
    pub fn active_records(&self) -> usize {
        self.registry
            .units
            .read()
            .values()
            .filter(|record| record.is_some())
            .count()
    }

    /// Number of live units, with or without a record.
    pub fn live_units(&self) -> usize {
        self.registry.units.read().len()
    }

    /// The record attached to `handle`, if that unit is still live.
    pub fn record_for(&self, handle: TaskHandle) -> Option<Arc<ContextRecord>> {
        self.registry.record(handle)
    }
}

/// Creates the context for the current request.
///
/// Assigns a fresh correlation id, attaches `{payload, correlation_id}` to the
/// currently executing unit and returns it. Creating a second context on the
/// same unit replaces the first for that unit and for children spawned
/// afterwards; children spawned earlier keep their copy.
pub fn create_context(payload: RequestMetadata) -> Result<Arc<ContextRecord>, ContextError> {
    let unit = CURRENT_UNIT
        .try_with(TrackedUnit::clone)
        .map_err(|_| ContextError::Untracked)?;
    let record = Arc::new(ContextRecord {
        request: payload,
        correlation_id: CorrelationId::new(),
    });
    unit.registry.attach(unit.handle, Arc::clone(&record))?;
    Ok(record)
}

/// The record of the currently executing unit, or `None` when no context was
/// established on this call path.
pub fn get_context() -> Option<Arc<ContextRecord>> {
    CURRENT_UNIT
        .try_with(|unit| unit.registry.record(unit.handle))
        .ok()
        .flatten()
}

/// The correlation id of the current request.
///
/// Only call this where a context is guaranteed; outside one it fails with
/// [`ContextError::NoActiveContext`].
pub fn correlation_id() -> Result<CorrelationId, ContextError> {
    get_context()
        .map(|record| record.correlation_id)
        .ok_or(ContextError::NoActiveContext)
}

/// Handle of the currently executing tracked unit.
pub fn current_task() -> Option<TaskHandle> {
    CURRENT_UNIT.try_with(|unit| unit.handle).ok()
}

/// Spawns `future` as a child of the current unit without needing a tracker.
///
/// Inside a tracked unit the child is registered with the same tracker and
/// inherits the current record. Outside one this is a plain `tokio::spawn`.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match CURRENT_UNIT.try_with(|unit| Arc::clone(&unit.registry)) {
        Ok(registry) => {
            let unit = registry.enter(get_context());
            tokio::spawn(run_in_unit(unit, future))
        }
        Err(_) => tokio::spawn(future),
    }
}
