//! The list/watch capability and its instrumentation decorator.
//!
//! A [`ListerWatcher`] lists the current object population and opens a
//! watch stream of subsequent changes. Implementations are scoped to one
//! resource kind and one namespace. [`InstrumentedListerWatcher`] records
//! call counts, failures, and latency for every call without changing the
//! result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

use crate::error::ListWatchError;
use crate::types::{ObjectList, Resource, WatchEvent};

/// Stream of watch frames. Ends when the server closes the watch.
pub type WatchStream<T> = BoxStream<'static, Result<WatchEvent<T>, ListWatchError>>;

/// Options for a list or watch call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Watch from (or list at) this resource version.
    pub resource_version: Option<String>,
    /// Server-side watch timeout.
    pub timeout_seconds: Option<u32>,
    pub allow_watch_bookmarks: bool,
}

/// List + watch access to one scoped object population.
#[async_trait]
pub trait ListerWatcher<T: Resource>: Send + Sync {
    async fn list(&self, opts: &ListOptions) -> Result<ObjectList<T>, ListWatchError>;

    async fn watch(&self, opts: &ListOptions) -> Result<WatchStream<T>, ListWatchError>;
}

/// Counters and latency histogram for list/watch calls.
#[derive(Clone)]
pub struct ListWatchMetrics {
    list_total: IntCounterVec,
    watch_total: IntCounterVec,
    duration: HistogramVec,
}

impl ListWatchMetrics {
    /// Create the collectors and register them with `registry`.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let list_total = IntCounterVec::new(
            Opts::new(
                "kube_event_exporter_list_total",
                "Number of total resource list calls in kube-event-exporter",
            ),
            &["result", "resource"],
        )?;
        let watch_total = IntCounterVec::new(
            Opts::new(
                "kube_event_exporter_watch_total",
                "Number of total resource watch calls in kube-event-exporter",
            ),
            &["result", "resource"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "kube_event_exporter_list_watch_duration_seconds",
                "Latency of resource list and watch calls in kube-event-exporter",
            ),
            &["operation", "resource"],
        )?;

        registry.register(Box::new(list_total.clone()))?;
        registry.register(Box::new(watch_total.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            list_total,
            watch_total,
            duration,
        })
    }

    fn observe(&self, operation: Operation, resource: &str, ok: bool, elapsed: Duration) {
        let result = if ok { "success" } else { "error" };
        let counter = match operation {
            Operation::List => &self.list_total,
            Operation::Watch => &self.watch_total,
        };
        counter.with_label_values(&[result, resource]).inc();
        self.duration
            .with_label_values(&[operation.as_str(), resource])
            .observe(elapsed.as_secs_f64());
    }

    /// Calls recorded so far for `(operation, result, resource)`.
    pub fn count(&self, operation: &str, result: &str, resource: &str) -> u64 {
        let counter = match operation {
            "list" => &self.list_total,
            _ => &self.watch_total,
        };
        counter.with_label_values(&[result, resource]).get()
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    List,
    Watch,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Watch => "watch",
        }
    }
}

/// Observability decorator around a [`ListerWatcher`].
///
/// The watch latency covers opening the stream, not its lifetime.
pub struct InstrumentedListerWatcher<T: Resource> {
    inner: Arc<dyn ListerWatcher<T>>,
    metrics: Arc<ListWatchMetrics>,
    resource: String,
}

impl<T: Resource> InstrumentedListerWatcher<T> {
    pub fn new(
        inner: Arc<dyn ListerWatcher<T>>,
        metrics: Arc<ListWatchMetrics>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            metrics,
            resource: resource.into(),
        }
    }
}

#[async_trait]
impl<T: Resource> ListerWatcher<T> for InstrumentedListerWatcher<T> {
    async fn list(&self, opts: &ListOptions) -> Result<ObjectList<T>, ListWatchError> {
        let start = Instant::now();
        let result = self.inner.list(opts).await;
        self.metrics
            .observe(Operation::List, &self.resource, result.is_ok(), start.elapsed());
        result
    }

    async fn watch(&self, opts: &ListOptions) -> Result<WatchStream<T>, ListWatchError> {
        let start = Instant::now();
        let result = self.inner.watch(opts).await;
        self.metrics
            .observe(Operation::Watch, &self.resource, result.is_ok(), start.elapsed());
        result
    }
}
