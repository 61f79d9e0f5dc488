//! Builder: wires enabled resource kinds into running metrics stores.
//!
//! For every enabled kind the builder filters and composes the kind's
//! family generators, creates one [`MetricsStore`], and spawns one
//! reflector per configured namespace. Each reflector's list/watch source
//! is instrumented and then sharded before it reaches the store, and each
//! reflector writes through its own [`StoreSlice`](crate::store::StoreSlice)
//! so a relist in one namespace never drops another namespace's entries.
//!
//! ```text
//! ListWatchFactory(kind, ns) → Instrumented → Sharded → Reflector → slice(ns) ─┐
//! ListWatchFactory(kind, ns) → Instrumented → Sharded → Reflector → slice(ns) ─┴→ MetricsStore(kind)
//! ```
//!
//! `build()` must be called from within a tokio runtime.

use std::sync::Arc;

use prometheus::Registry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use event_metrics::{compose, extract_headers, filter_families, AllowDenyLister};

use crate::error::BuildError;
use crate::kinds::ResourceKind;
use crate::listwatch::{InstrumentedListerWatcher, ListWatchMetrics, ListerWatcher};
use crate::reflector::{Reflector, ReflectorConfig};
use crate::sharding::{ShardedListWatch, Sharding};
use crate::store::{MetricsStore, Store};
use crate::types::{Event, Resource};

/// Creates list/watch sources scoped to one kind and one namespace.
///
/// An empty namespace means all namespaces.
pub trait ListWatchFactory: Send + Sync {
    fn list_watch(&self, kind: ResourceKind, namespace: &str) -> Arc<dyn ListerWatcher<Event>>;
}

/// Store-construction configuration. Consumed by [`Builder::build`].
pub struct Builder {
    factory: Option<Arc<dyn ListWatchFactory>>,
    allow_deny_list: Option<Arc<dyn AllowDenyLister>>,
    shutdown: Option<watch::Receiver<bool>>,
    metrics: Option<Arc<ListWatchMetrics>>,
    enabled_resources: Vec<ResourceKind>,
    namespaces: Vec<String>,
    shard: u32,
    total_shards: u32,
    reflector_config: ReflectorConfig,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            factory: None,
            allow_deny_list: None,
            shutdown: None,
            metrics: None,
            enabled_resources: Vec::new(),
            namespaces: Vec::new(),
            shard: 0,
            total_shards: 1,
            reflector_config: ReflectorConfig::default(),
        }
    }

    /// Validate and set the enabled kinds. Duplicates collapse; the result
    /// is sorted by name.
    pub fn with_enabled_resources<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self, BuildError> {
        let mut kinds = names
            .iter()
            .map(|n| n.as_ref().parse::<ResourceKind>())
            .collect::<Result<Vec<_>, _>>()?;
        kinds.sort_by_key(|k| k.name());
        kinds.dedup();
        self.enabled_resources = kinds;
        Ok(self)
    }

    /// Namespaces to watch, one reflector each per kind. `""` means all.
    pub fn with_namespaces<S: Into<String>>(mut self, namespaces: impl IntoIterator<Item = S>) -> Self {
        let mut seen = Vec::new();
        for ns in namespaces.into_iter().map(Into::into) {
            if !seen.contains(&ns) {
                seen.push(ns);
            }
        }
        self.namespaces = seen;
        self
    }

    /// Shard index and total shard count. A total of 0 means no sharding.
    pub fn with_sharding(mut self, shard: u32, total_shards: u32) -> Self {
        self.shard = shard;
        self.total_shards = total_shards;
        self
    }

    /// Signal that stops every reflector when it flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn with_list_watch_factory(mut self, factory: Arc<dyn ListWatchFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_allow_deny_list(mut self, list: Arc<dyn AllowDenyLister>) -> Self {
        self.allow_deny_list = Some(list);
        self
    }

    /// Register list/watch instrumentation with `registry`.
    pub fn with_metrics(mut self, registry: &Registry) -> Result<Self, BuildError> {
        let metrics = ListWatchMetrics::new(registry)
            .map_err(|e| BuildError::Instrumentation(e.to_string()))?;
        self.metrics = Some(Arc::new(metrics));
        Ok(self)
    }

    pub fn with_reflector_config(mut self, config: ReflectorConfig) -> Self {
        self.reflector_config = config;
        self
    }

    pub fn enabled_resources(&self) -> &[ResourceKind] {
        &self.enabled_resources
    }

    /// Create every store and start its reflectors.
    pub fn build(self) -> Result<BuiltStores, BuildError> {
        let allow_deny = self
            .allow_deny_list
            .ok_or(BuildError::MissingAllowDenyList)?;
        let factory = self
            .factory
            .ok_or(BuildError::MissingCollaborator("list/watch factory"))?;
        let shutdown = self
            .shutdown
            .ok_or(BuildError::MissingCollaborator("shutdown signal"))?;
        let sharding = Sharding::new(self.shard, self.total_shards)?;
        let metrics = match self.metrics {
            Some(m) => m,
            None => Arc::new(
                ListWatchMetrics::new(&Registry::new())
                    .map_err(|e| BuildError::Instrumentation(e.to_string()))?,
            ),
        };

        let mut built = BuiltStores {
            stores: Vec::with_capacity(self.enabled_resources.len()),
            active: Vec::with_capacity(self.enabled_resources.len()),
            reflectors: Vec::new(),
        };

        for kind in &self.enabled_resources {
            let families = filter_families(allow_deny.as_ref(), kind.families().to_vec());
            let headers = extract_headers(&families);
            let store = Arc::new(MetricsStore::new(headers, compose(&families)));

            if self.namespaces.is_empty() {
                warn!(resource = %kind, "no namespaces configured; store will only export headers");
            }

            for ns in &self.namespaces {
                let source = factory.list_watch(*kind, ns);
                let instrumented: Arc<dyn ListerWatcher<Event>> = Arc::new(
                    InstrumentedListerWatcher::new(source, Arc::clone(&metrics), Event::TYPE_NAME),
                );
                let sharded: Arc<dyn ListerWatcher<Event>> =
                    Arc::new(ShardedListWatch::new(instrumented, sharding));

                let name = if ns.is_empty() {
                    format!("{kind}/*")
                } else {
                    format!("{kind}/{ns}")
                };
                let slice: Arc<dyn Store<Event>> = Arc::new(store.slice(ns.clone()));
                let reflector = Reflector::new(name, sharded, slice, self.reflector_config.clone());
                built.reflectors.push(tokio::spawn(reflector.run(shutdown.clone())));
            }

            built.stores.push(store);
            built.active.push(*kind);
        }

        let active: Vec<&str> = built.active.iter().map(ResourceKind::name).collect();
        info!(
            resources = %active.join(","),
            namespaces = self.namespaces.len(),
            shard = sharding.shard(),
            total_shards = sharding.total(),
            "active resources"
        );

        Ok(built)
    }
}

/// The result of [`Builder::build`].
pub struct BuiltStores {
    /// One store per active kind, in `active` order.
    pub stores: Vec<Arc<MetricsStore<Event>>>,
    pub active: Vec<ResourceKind>,
    /// One task per (kind, namespace).
    pub reflectors: Vec<JoinHandle<()>>,
}

impl BuiltStores {
    /// Store for `kind`, if it is active.
    pub fn store(&self, kind: ResourceKind) -> Option<&Arc<MetricsStore<Event>>> {
        self.active
            .iter()
            .position(|k| *k == kind)
            .map(|i| &self.stores[i])
    }

    /// Concatenated exposition text of every store.
    pub fn render(&self) -> String {
        render_all(&self.stores)
    }

    /// Wait for every reflector to exit.
    pub async fn join(self) {
        for handle in self.reflectors {
            if let Err(e) = handle.await {
                warn!(error = %e, "reflector task failed");
            }
        }
    }
}

/// Concatenate the exposition text of `stores`.
pub fn render_all(stores: &[Arc<MetricsStore<Event>>]) -> String {
    let mut out = String::new();
    for store in stores {
        store.write_all(&mut out);
    }
    out
}
