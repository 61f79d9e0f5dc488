//! End-to-end builder scenarios.
//!
//! Drives real stores and reflectors through an in-memory cluster whose
//! watch streams are fed by the test.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use prometheus::Registry;
use tokio::sync::{mpsc, watch};

use event_metrics::AllowDenyList;
use event_store::*;

// ── Fake cluster ───────────────────────────────────────────────────

struct FakeSource {
    initial: Mutex<Vec<Event>>,
    tx: mpsc::UnboundedSender<WatchEvent<Event>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<WatchEvent<Event>>>>,
}

impl FakeSource {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            initial: Mutex::new(Vec::new()),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    fn send(&self, event: WatchEvent<Event>) {
        self.tx.send(event).unwrap();
    }
}

#[async_trait]
impl ListerWatcher<Event> for FakeSource {
    async fn list(&self, _opts: &ListOptions) -> Result<ObjectList<Event>, ListWatchError> {
        Ok(ObjectList::new("1", self.initial.lock().unwrap().clone()))
    }

    async fn watch(&self, _opts: &ListOptions) -> Result<WatchStream<Event>, ListWatchError> {
        match self.rx.lock().unwrap().take() {
            Some(rx) => Ok(futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|ev| (Ok(ev), rx))
            })
            .boxed()),
            None => Ok(futures_util::stream::pending().boxed()),
        }
    }
}

#[derive(Default)]
struct FakeCluster {
    sources: Mutex<HashMap<(ResourceKind, String), Arc<FakeSource>>>,
}

impl FakeCluster {
    fn source(&self, kind: ResourceKind, namespace: &str) -> Arc<FakeSource> {
        self.sources
            .lock()
            .unwrap()
            .entry((kind, namespace.to_string()))
            .or_insert_with(|| Arc::new(FakeSource::new()))
            .clone()
    }

    fn source_count(&self) -> usize {
        self.sources.lock().unwrap().len()
    }
}

impl ListWatchFactory for FakeCluster {
    fn list_watch(&self, kind: ResourceKind, namespace: &str) -> Arc<dyn ListerWatcher<Event>> {
        self.source(kind, namespace)
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn configmap_event(ns: &str, name: &str, message: &str) -> Event {
    let mut e = Event {
        metadata: ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(format!("{name}.event")),
            resource_version: Some("2".to_string()),
            ..Default::default()
        },
        reason: Some("Created".to_string()),
        message: Some(message.to_string()),
        type_: Some("Normal".to_string()),
        ..Default::default()
    };
    e.involved_object = ObjectReference {
        kind: Some("ConfigMap".to_string()),
        namespace: Some(ns.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    };
    e
}

fn builder(cluster: &Arc<FakeCluster>, shutdown: watch::Receiver<bool>) -> Builder {
    Builder::new()
        .with_list_watch_factory(cluster.clone())
        .with_allow_deny_list(Arc::new(AllowDenyList::permit_all()))
        .with_shutdown(shutdown)
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

const CM1_SERIES: &str = "kube_configmap_events{namespace=\"default\",configmap=\"cm1\",reason=\"Created\",type=\"Normal\",message=\"ok\"} 1";

// ── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn single_configmap_event_is_exported() {
    let cluster = Arc::new(FakeCluster::default());
    let (tx, rx) = watch::channel(false);
    let built = builder(&cluster, rx)
        .with_enabled_resources(&["configmaps"])
        .unwrap()
        .with_namespaces(["default"])
        .with_sharding(0, 1)
        .build()
        .unwrap();

    assert_eq!(built.active, vec![ResourceKind::ConfigMaps]);
    cluster
        .source(ResourceKind::ConfigMaps, "default")
        .send(WatchEvent::Added(configmap_event("default", "cm1", "ok")));

    let store = built.store(ResourceKind::ConfigMaps).unwrap().clone();
    wait_for(|| store.render().contains(CM1_SERIES)).await;

    let text = built.render();
    assert!(text.starts_with(
        "# HELP kube_configmap_events ConfigMap events.\n# TYPE kube_configmap_events gauge\n"
    ));
    assert!(text.contains(&format!("{CM1_SERIES}\n")));

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), built.join())
        .await
        .expect("reflectors should stop on shutdown");
}

#[tokio::test]
async fn denied_family_leaves_no_trace() {
    let cluster = Arc::new(FakeCluster::default());
    let (_tx, rx) = watch::channel(false);
    let deny = AllowDenyList::new(&[], &["kube_configmap_events".to_string()]).unwrap();
    let built = builder(&cluster, rx)
        .with_allow_deny_list(Arc::new(deny))
        .with_enabled_resources(&["configmaps"])
        .unwrap()
        .with_namespaces(["default"])
        .build()
        .unwrap();

    cluster
        .source(ResourceKind::ConfigMaps, "default")
        .send(WatchEvent::Added(configmap_event("default", "cm1", "ok")));

    let store = built.store(ResourceKind::ConfigMaps).unwrap().clone();
    wait_for(|| store.len() == 1).await;
    assert!(!built.render().contains("kube_configmap_events"));
    assert_eq!(built.render(), "");
}

#[tokio::test]
async fn objects_of_other_shards_never_reach_the_store() {
    let foreign = (0..)
        .map(|i| format!("cm-{i}"))
        .find(|name| owns(&format!("default/{name}.event"), 1, 2))
        .unwrap();
    let local = (0..)
        .map(|i| format!("cm-{i}"))
        .find(|name| owns(&format!("default/{name}.event"), 0, 2))
        .unwrap();

    let cluster = Arc::new(FakeCluster::default());
    let source = cluster.source(ResourceKind::ConfigMaps, "default");
    source
        .initial
        .lock()
        .unwrap()
        .push(configmap_event("default", &foreign, "listed"));

    let (_tx, rx) = watch::channel(false);
    let built = builder(&cluster, rx)
        .with_enabled_resources(&["configmaps"])
        .unwrap()
        .with_namespaces(["default"])
        .with_sharding(0, 2)
        .build()
        .unwrap();

    source.send(WatchEvent::Added(configmap_event("default", &foreign, "watched")));
    source.send(WatchEvent::Added(configmap_event("default", &local, "ok")));

    let store = built.store(ResourceKind::ConfigMaps).unwrap().clone();
    wait_for(|| store.len() == 1).await;

    let text = store.render();
    assert!(text.contains(&format!("configmap=\"{local}\"")));
    assert!(!text.contains(&format!("configmap=\"{foreign}\"")));
    assert_eq!(store.list(), vec![format!("default/{local}.event")]);
}

#[tokio::test]
async fn update_replaces_previous_message() {
    let cluster = Arc::new(FakeCluster::default());
    let (_tx, rx) = watch::channel(false);
    let built = builder(&cluster, rx)
        .with_enabled_resources(&["configmaps"])
        .unwrap()
        .with_namespaces(["default"])
        .build()
        .unwrap();

    let source = cluster.source(ResourceKind::ConfigMaps, "default");
    source.send(WatchEvent::Added(configmap_event("default", "cm1", "first")));
    source.send(WatchEvent::Modified(configmap_event("default", "cm1", "second")));

    let store = built.store(ResourceKind::ConfigMaps).unwrap().clone();
    wait_for(|| store.render().contains("message=\"second\"")).await;
    assert!(!store.render().contains("message=\"first\""));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn delete_removes_series() {
    let cluster = Arc::new(FakeCluster::default());
    let source = cluster.source(ResourceKind::ConfigMaps, "default");
    source
        .initial
        .lock()
        .unwrap()
        .push(configmap_event("default", "cm1", "ok"));

    let (_tx, rx) = watch::channel(false);
    let built = builder(&cluster, rx)
        .with_enabled_resources(&["configmaps"])
        .unwrap()
        .with_namespaces(["default"])
        .build()
        .unwrap();

    let store = built.store(ResourceKind::ConfigMaps).unwrap().clone();
    wait_for(|| store.len() == 1).await;

    source.send(WatchEvent::Deleted(configmap_event("default", "cm1", "ok")));
    wait_for(|| store.is_empty()).await;
    assert!(!store.render().contains("cm1"));
}

#[tokio::test]
async fn namespaces_share_one_store_per_kind() {
    let cluster = Arc::new(FakeCluster::default());
    let (_tx, rx) = watch::channel(false);
    let built = builder(&cluster, rx)
        .with_enabled_resources(&["configmaps", "pods"])
        .unwrap()
        .with_namespaces(["default", "kube-system", "default"])
        .build()
        .unwrap();

    assert_eq!(built.stores.len(), 2);
    assert_eq!(built.reflectors.len(), 4);
    assert_eq!(cluster.source_count(), 4);

    cluster
        .source(ResourceKind::ConfigMaps, "default")
        .send(WatchEvent::Added(configmap_event("default", "cm1", "ok")));
    cluster
        .source(ResourceKind::ConfigMaps, "kube-system")
        .send(WatchEvent::Added(configmap_event("kube-system", "cm1", "ok")));

    let store = built.store(ResourceKind::ConfigMaps).unwrap().clone();
    wait_for(|| store.len() == 2).await;
    assert_eq!(
        store.list(),
        vec!["default/cm1.event".to_string(), "kube-system/cm1.event".to_string()]
    );
    assert!(built.store(ResourceKind::Pods).unwrap().is_empty());
}

#[tokio::test]
async fn initial_lists_of_every_namespace_survive() {
    let cluster = Arc::new(FakeCluster::default());
    *cluster
        .source(ResourceKind::ConfigMaps, "default")
        .initial
        .lock()
        .unwrap() = vec![configmap_event("default", "cm1", "ok")];
    *cluster
        .source(ResourceKind::ConfigMaps, "kube-system")
        .initial
        .lock()
        .unwrap() = vec![configmap_event("kube-system", "cm2", "ok")];

    let (_tx, rx) = watch::channel(false);
    let built = builder(&cluster, rx)
        .with_enabled_resources(&["configmaps"])
        .unwrap()
        .with_namespaces(["default", "kube-system"])
        .build()
        .unwrap();

    let store = built.store(ResourceKind::ConfigMaps).unwrap().clone();
    wait_for(|| store.len() == 2).await;
    assert_eq!(
        store.list(),
        vec!["default/cm1.event".to_string(), "kube-system/cm2.event".to_string()]
    );
    assert_eq!(store.resource_version("default").as_deref(), Some("1"));
    assert_eq!(store.resource_version("kube-system").as_deref(), Some("1"));

    // A change in one namespace leaves the other's listed entry alone.
    cluster
        .source(ResourceKind::ConfigMaps, "default")
        .send(WatchEvent::Deleted(configmap_event("default", "cm1", "ok")));
    wait_for(|| store.len() == 1).await;
    assert_eq!(store.list(), vec!["kube-system/cm2.event".to_string()]);
    assert!(built.render().contains("configmap=\"cm2\""));
}

#[tokio::test]
async fn zero_namespaces_exports_headers_only() {
    let cluster = Arc::new(FakeCluster::default());
    let (_tx, rx) = watch::channel(false);
    let built = builder(&cluster, rx)
        .with_enabled_resources(&["pods"])
        .unwrap()
        .build()
        .unwrap();

    assert!(built.reflectors.is_empty());
    assert_eq!(
        built.render(),
        "# HELP kube_pod_events Pod events.\n# TYPE kube_pod_events gauge\n"
    );
}

#[tokio::test]
async fn instrumentation_is_registered() {
    let cluster = Arc::new(FakeCluster::default());
    let registry = Registry::new();
    let (_tx, rx) = watch::channel(false);
    let built = builder(&cluster, rx)
        .with_metrics(&registry)
        .unwrap()
        .with_enabled_resources(&["configmaps"])
        .unwrap()
        .with_namespaces(["default"])
        .build()
        .unwrap();

    let store = built.store(ResourceKind::ConfigMaps).unwrap().clone();
    cluster
        .source(ResourceKind::ConfigMaps, "default")
        .send(WatchEvent::Added(configmap_event("default", "cm1", "ok")));
    wait_for(|| store.len() == 1).await;

    let names: Vec<String> = registry
        .gather()
        .iter()
        .map(|mf| mf.get_name().to_string())
        .collect();
    assert!(names.contains(&"kube_event_exporter_list_total".to_string()));
    assert!(names.contains(&"kube_event_exporter_watch_total".to_string()));
}

// ── Configuration errors ───────────────────────────────────────────

#[test]
fn unknown_resource_is_rejected() {
    let err = Builder::new()
        .with_enabled_resources(&["configmaps", "widgets"])
        .err()
        .unwrap();
    assert!(matches!(err, BuildError::UnknownResource { ref name, .. } if name == "widgets"));
}

#[test]
fn enabled_resources_are_sorted_and_deduplicated() {
    let builder = Builder::new()
        .with_enabled_resources(&["pods", "configmaps", "pods"])
        .unwrap();
    assert_eq!(
        builder.enabled_resources(),
        &[ResourceKind::ConfigMaps, ResourceKind::Pods]
    );
}

#[tokio::test]
async fn missing_allow_deny_list_fails_build() {
    let cluster = Arc::new(FakeCluster::default());
    let (_tx, rx) = watch::channel(false);
    let result = Builder::new()
        .with_list_watch_factory(cluster)
        .with_shutdown(rx)
        .with_enabled_resources(&["pods"])
        .unwrap()
        .build();
    assert!(matches!(result, Err(BuildError::MissingAllowDenyList)));
}

#[tokio::test]
async fn invalid_shard_fails_build() {
    let cluster = Arc::new(FakeCluster::default());
    let (_tx, rx) = watch::channel(false);
    let result = builder(&cluster, rx).with_sharding(3, 2).build();
    assert!(matches!(
        result,
        Err(BuildError::InvalidShard { shard: 3, total: 2 })
    ));
}
