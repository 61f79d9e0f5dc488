//! event-client: list/watch access to cluster events through `kube`.
//!
//! [`ApiClient`] implements `event_store::ListWatchFactory`: for each
//! (kind, namespace) pair it hands the builder an [`EventListWatch`]
//! restricted to events whose involved object is of that kind.
//!
//! ```text
//! ClusterOptions ── kubeconfig / in-cluster / --apiserver ──→ kube::Client
//! EventListWatch
//!   ├── list:  Api<Event>::list(fieldSelector=involvedObject.kind=Pod)
//!   └── watch: Api<Event>::watch(.., resourceVersion) → WatchEvent<Event>
//! ```

pub mod client;
pub mod config;
pub mod error;

pub use client::{ApiClient, EventListWatch};
pub use config::ClusterOptions;
pub use error::ClientError;
