//! List/watch client for core `v1` events.
//!
//! A thin adapter from `kube::Api<Event>` onto the store's
//! [`ListerWatcher`] seam: requests are scoped by namespace and field
//! selector, and `kube` errors and watch frames are mapped onto the
//! store's own types.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use kube::api::{ListParams, WatchParams};
use kube::core::WatchEvent as KubeWatchEvent;
use kube::{Api, Client};
use tracing::debug;

use event_store::{
    Bookmark, Event, ListOptions, ListWatchError, ListWatchFactory, ListerWatcher, ObjectList,
    ResourceKind, Status, WatchEvent, WatchStream,
};

/// Longest server-side watch timeout `kube` accepts.
const MAX_WATCH_TIMEOUT_SECS: u32 = 290;

/// Shared API client handing out one list/watch source per (kind, namespace).
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
}

impl ApiClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Events in `namespace` (`""` for all namespaces) matching `field_selector`.
    pub fn events(&self, namespace: &str, field_selector: impl Into<String>) -> EventListWatch {
        let api = if namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        };
        EventListWatch {
            api,
            namespace: namespace.to_string(),
            field_selector: field_selector.into(),
        }
    }
}

impl ListWatchFactory for ApiClient {
    fn list_watch(&self, kind: ResourceKind, namespace: &str) -> Arc<dyn ListerWatcher<Event>> {
        Arc::new(self.events(namespace, kind.field_selector()))
    }
}

/// Lists and watches the events of one namespace.
pub struct EventListWatch {
    api: Api<Event>,
    namespace: String,
    field_selector: String,
}

impl EventListWatch {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn field_selector(&self) -> &str {
        &self.field_selector
    }

    fn list_params(&self, opts: &ListOptions) -> ListParams {
        let mut params = ListParams::default();
        if !self.field_selector.is_empty() {
            params = params.fields(&self.field_selector);
        }
        if let Some(rv) = opts.resource_version.as_deref().filter(|rv| !rv.is_empty()) {
            params.resource_version = Some(rv.to_string());
        }
        params
    }

    fn watch_params(&self, opts: &ListOptions) -> WatchParams {
        let mut params = WatchParams::default();
        if !self.field_selector.is_empty() {
            params = params.fields(&self.field_selector);
        }
        if let Some(timeout) = opts.timeout_seconds {
            params = params.timeout(timeout.min(MAX_WATCH_TIMEOUT_SECS));
        }
        if !opts.allow_watch_bookmarks {
            params = params.disable_bookmarks();
        }
        params
    }
}

#[async_trait]
impl ListerWatcher<Event> for EventListWatch {
    async fn list(&self, opts: &ListOptions) -> Result<ObjectList<Event>, ListWatchError> {
        debug!(namespace = %self.namespace, selector = %self.field_selector, "listing events");
        let list = self
            .api
            .list(&self.list_params(opts))
            .await
            .map_err(list_watch_error)?;
        Ok(ObjectList::new(
            list.metadata.resource_version.unwrap_or_default(),
            list.items,
        ))
    }

    async fn watch(&self, opts: &ListOptions) -> Result<WatchStream<Event>, ListWatchError> {
        let version = opts.resource_version.as_deref().unwrap_or("0");
        debug!(namespace = %self.namespace, selector = %self.field_selector, %version, "watching events");
        let stream = self
            .api
            .watch(&self.watch_params(opts), version)
            .await
            .map_err(list_watch_error)?;
        Ok(stream
            .map(|frame| frame.map(watch_event).map_err(list_watch_error))
            .boxed())
    }
}

fn watch_event(event: KubeWatchEvent<Event>) -> WatchEvent<Event> {
    match event {
        KubeWatchEvent::Added(obj) => WatchEvent::Added(obj),
        KubeWatchEvent::Modified(obj) => WatchEvent::Modified(obj),
        KubeWatchEvent::Deleted(obj) => WatchEvent::Deleted(obj),
        KubeWatchEvent::Bookmark(b) => WatchEvent::Bookmark(Bookmark {
            resource_version: b.metadata.resource_version,
        }),
        KubeWatchEvent::Error(e) => WatchEvent::Error(Status {
            code: e.code,
            reason: e.reason,
            message: e.message,
        }),
    }
}

/// 410 Gone means the requested resource version is no longer served.
fn list_watch_error(err: kube::Error) -> ListWatchError {
    match err {
        kube::Error::Api(e) if e.code == 410 => ListWatchError::Expired(e.message),
        kube::Error::Api(e) => ListWatchError::Status {
            code: e.code,
            message: e.message,
        },
        kube::Error::SerdeError(e) => ListWatchError::Decode(e.to_string()),
        other => ListWatchError::Transport(other.to_string()),
    }
}
