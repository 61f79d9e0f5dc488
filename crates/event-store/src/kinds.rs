//! Registry of resource kinds the exporter can watch events for.
//!
//! Each kind maps to a static table of family generators over [`Event`]s
//! whose involved object is of that kind. The registry is a fixed enum;
//! unknown names are rejected when the configuration is parsed.

use std::fmt;
use std::str::FromStr;

use event_metrics::{Family, FamilyGenerator, Metric, MetricError, MetricType};

use crate::error::BuildError;
use crate::types::Event;

/// A resource kind with an event metrics store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    ConfigMaps,
    DaemonSets,
    Deployments,
    Nodes,
    PersistentVolumeClaims,
    Pods,
    ReplicaSets,
    Services,
    StatefulSets,
}

impl ResourceKind {
    /// Every available kind, sorted by name.
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::ConfigMaps,
        ResourceKind::DaemonSets,
        ResourceKind::Deployments,
        ResourceKind::Nodes,
        ResourceKind::PersistentVolumeClaims,
        ResourceKind::Pods,
        ResourceKind::ReplicaSets,
        ResourceKind::Services,
        ResourceKind::StatefulSets,
    ];

    /// Configuration name, e.g. `configmaps`.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::ConfigMaps => "configmaps",
            ResourceKind::DaemonSets => "daemonsets",
            ResourceKind::Deployments => "deployments",
            ResourceKind::Nodes => "nodes",
            ResourceKind::PersistentVolumeClaims => "persistentvolumeclaims",
            ResourceKind::Pods => "pods",
            ResourceKind::ReplicaSets => "replicasets",
            ResourceKind::Services => "services",
            ResourceKind::StatefulSets => "statefulsets",
        }
    }

    /// The `involvedObject.kind` of events for this kind.
    pub fn involved_kind(&self) -> &'static str {
        match self {
            ResourceKind::ConfigMaps => "ConfigMap",
            ResourceKind::DaemonSets => "DaemonSet",
            ResourceKind::Deployments => "Deployment",
            ResourceKind::Nodes => "Node",
            ResourceKind::PersistentVolumeClaims => "PersistentVolumeClaim",
            ResourceKind::Pods => "Pod",
            ResourceKind::ReplicaSets => "ReplicaSet",
            ResourceKind::Services => "Service",
            ResourceKind::StatefulSets => "StatefulSet",
        }
    }

    /// Server-side field selector restricting events to this kind.
    pub fn field_selector(&self) -> String {
        format!("involvedObject.kind={}", self.involved_kind())
    }

    /// Static family generators for this kind.
    pub fn families(&self) -> &'static [FamilyGenerator<Event>] {
        match self {
            ResourceKind::ConfigMaps => &CONFIGMAP_FAMILIES,
            ResourceKind::DaemonSets => &DAEMONSET_FAMILIES,
            ResourceKind::Deployments => &DEPLOYMENT_FAMILIES,
            ResourceKind::Nodes => &NODE_FAMILIES,
            ResourceKind::PersistentVolumeClaims => &PVC_FAMILIES,
            ResourceKind::Pods => &POD_FAMILIES,
            ResourceKind::ReplicaSets => &REPLICASET_FAMILIES,
            ResourceKind::Services => &SERVICE_FAMILIES,
            ResourceKind::StatefulSets => &STATEFULSET_FAMILIES,
        }
    }

    /// Look a kind up by configuration name.
    pub fn lookup(name: &str) -> Option<ResourceKind> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s).ok_or_else(|| BuildError::UnknownResource {
            name: s.to_string(),
            available: available_resources().join(","),
        })
    }
}

/// Names of every available kind.
pub fn available_resources() -> Vec<&'static str> {
    ResourceKind::ALL.iter().map(ResourceKind::name).collect()
}

// ── Family tables ──────────────────────────────────────────────────

static CONFIGMAP_FAMILIES: [FamilyGenerator<Event>; 1] = [FamilyGenerator::new(
    "kube_configmap_events",
    MetricType::Gauge,
    "ConfigMap events.",
    configmap_events,
)];

static DAEMONSET_FAMILIES: [FamilyGenerator<Event>; 1] = [FamilyGenerator::new(
    "kube_daemonset_events",
    MetricType::Gauge,
    "DaemonSet events.",
    daemonset_events,
)];

static DEPLOYMENT_FAMILIES: [FamilyGenerator<Event>; 1] = [FamilyGenerator::new(
    "kube_deployment_events",
    MetricType::Gauge,
    "Deployment events.",
    deployment_events,
)];

static NODE_FAMILIES: [FamilyGenerator<Event>; 1] = [FamilyGenerator::new(
    "kube_node_events",
    MetricType::Gauge,
    "Node events.",
    node_events,
)];

static PVC_FAMILIES: [FamilyGenerator<Event>; 1] = [FamilyGenerator::new(
    "kube_persistentvolumeclaim_events",
    MetricType::Gauge,
    "PersistentVolumeClaim events.",
    persistentvolumeclaim_events,
)];

static POD_FAMILIES: [FamilyGenerator<Event>; 1] = [FamilyGenerator::new(
    "kube_pod_events",
    MetricType::Gauge,
    "Pod events.",
    pod_events,
)];

static REPLICASET_FAMILIES: [FamilyGenerator<Event>; 1] = [FamilyGenerator::new(
    "kube_replicaset_events",
    MetricType::Gauge,
    "ReplicaSet events.",
    replicaset_events,
)];

static SERVICE_FAMILIES: [FamilyGenerator<Event>; 1] = [FamilyGenerator::new(
    "kube_service_events",
    MetricType::Gauge,
    "Service events.",
    service_events,
)];

static STATEFULSET_FAMILIES: [FamilyGenerator<Event>; 1] = [FamilyGenerator::new(
    "kube_statefulset_events",
    MetricType::Gauge,
    "StatefulSet events.",
    statefulset_events,
)];

/// How an event family labels its involved object.
struct EventLabels {
    /// Label carrying the involved object's name, e.g. `deployment`.
    object: &'static str,
    /// `asserts_entity_type` value; `None` omits the asserts labels.
    entity_type: Option<&'static str>,
    namespaced: bool,
}

fn configmap_events(e: &Event) -> Result<Family, MetricError> {
    event_family(
        e,
        EventLabels {
            object: "configmap",
            entity_type: None,
            namespaced: true,
        },
    )
}

fn daemonset_events(e: &Event) -> Result<Family, MetricError> {
    event_family(e, namespaced("daemonset", "DaemonSet"))
}

fn deployment_events(e: &Event) -> Result<Family, MetricError> {
    event_family(e, namespaced("deployment", "Deployment"))
}

fn node_events(e: &Event) -> Result<Family, MetricError> {
    event_family(
        e,
        EventLabels {
            object: "node",
            entity_type: Some("Node"),
            namespaced: false,
        },
    )
}

fn persistentvolumeclaim_events(e: &Event) -> Result<Family, MetricError> {
    event_family(e, namespaced("persistentvolumeclaim", "PersistentVolumeClaim"))
}

fn pod_events(e: &Event) -> Result<Family, MetricError> {
    event_family(e, namespaced("pod", "Pod"))
}

fn replicaset_events(e: &Event) -> Result<Family, MetricError> {
    event_family(e, namespaced("replicaset", "ReplicaSet"))
}

fn service_events(e: &Event) -> Result<Family, MetricError> {
    event_family(e, namespaced("service", "Service"))
}

fn statefulset_events(e: &Event) -> Result<Family, MetricError> {
    event_family(e, namespaced("statefulset", "StatefulSet"))
}

fn namespaced(object: &'static str, entity_type: &'static str) -> EventLabels {
    EventLabels {
        object,
        entity_type: Some(entity_type),
        namespaced: true,
    }
}

/// One sample (value 1) describing the event's reason, type, and message.
fn event_family(e: &Event, labels: EventLabels) -> Result<Family, MetricError> {
    let involved = &e.involved_object;
    let name = involved.name.as_deref().unwrap_or("");
    if name.is_empty() {
        return Err(MetricError::MalformedObject(
            "event has no involved object name".to_string(),
        ));
    }
    let type_ = e.type_.as_deref().unwrap_or("");

    let mut keys: Vec<&str> = Vec::with_capacity(8);
    let mut values: Vec<&str> = Vec::with_capacity(8);
    if labels.namespaced {
        keys.push("namespace");
        values.push(involved.namespace.as_deref().unwrap_or(""));
    }
    keys.extend([labels.object, "reason", "type", "message"]);
    values.extend([
        name,
        e.reason.as_deref().unwrap_or(""),
        type_,
        e.message.as_deref().unwrap_or(""),
    ]);

    if let Some(entity_type) = labels.entity_type {
        let category = if type_ == "Normal" { "amend" } else { "failure" };
        keys.extend(["asserts_entity_type", "asserts_alert_type", "asserts_alert_category"]);
        values.extend([entity_type, "cause", category]);
    }

    Ok(Family::new(vec![Metric::new(keys, values, 1.0)?]))
}
