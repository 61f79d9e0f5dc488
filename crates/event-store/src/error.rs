//! Error types for stores, list/watch calls, and store construction.

use thiserror::Error;

use event_metrics::MetricError;

/// Per-object failures. The offending object is skipped; the store is
/// left untouched for it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object has no name")]
    MissingName,

    #[error("failed to render object {key}: {source}")]
    Render {
        key: String,
        #[source]
        source: MetricError,
    },
}

/// Failures of a list or watch call against the cluster.
#[derive(Debug, Error)]
pub enum ListWatchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("api server returned {code}: {message}")]
    Status { code: u16, message: String },

    /// The requested resource version is too old; a fresh list is required.
    #[error("resource version expired: {0}")]
    Expired(String),

    #[error("decode error: {0}")]
    Decode(String),
}

/// Configuration errors surfaced before any watch loop starts.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("resource {name} does not exist. Available resources: {available}")]
    UnknownResource { name: String, available: String },

    #[error("allow/deny list must be configured before build")]
    MissingAllowDenyList,

    #[error("{0} must be configured before build")]
    MissingCollaborator(&'static str),

    #[error("shard {shard} out of range for {total} total shards")]
    InvalidShard { shard: u32, total: u32 },

    #[error("failed to register list/watch metrics: {0}")]
    Instrumentation(String),
}
