//! Cluster object types consumed by the stores.
//!
//! Objects are the `k8s-openapi` models. List and watch results are carried
//! in small frame types so stores and reflectors stay independent of the
//! client that produced them.

use k8s_openapi::Metadata;

use crate::error::StoreError;

pub use k8s_openapi::api::core::v1::{Event, ObjectReference};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// A list response: the full object population plus its resource version.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectList<T> {
    pub resource_version: String,
    pub items: Vec<T>,
}

impl<T> ObjectList<T> {
    pub fn new(resource_version: impl Into<String>, items: Vec<T>) -> Self {
        Self {
            resource_version: resource_version.into(),
            items,
        }
    }

    pub fn resource_version(&self) -> &str {
        &self.resource_version
    }
}

/// Failure status reported inside a watch stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    pub code: u16,
    pub reason: String,
    pub message: String,
}

/// One frame of a watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
    Bookmark(Bookmark),
    Error(Status),
}

/// Bookmark frames carry only a resource version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bookmark {
    pub resource_version: String,
}

/// A watchable cluster object.
pub trait Resource: Metadata<Ty = ObjectMeta> + Clone + Send + Sync + 'static {
    /// Type name used in instrumentation labels.
    const TYPE_NAME: &'static str;
}

impl Resource for Event {
    const TYPE_NAME: &'static str = "v1.Event";
}

/// Cache key for an object: `namespace/name`, or `name` when cluster scoped.
pub fn object_key<T: Resource>(obj: &T) -> Result<String, StoreError> {
    let meta = obj.metadata();
    let name = meta
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or(StoreError::MissingName)?;

    match meta.namespace.as_deref() {
        Some(ns) if !ns.is_empty() => Ok(format!("{ns}/{name}")),
        _ => Ok(name.to_string()),
    }
}
