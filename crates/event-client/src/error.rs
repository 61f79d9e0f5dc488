//! Client construction errors.

use std::path::PathBuf;

use kube::config::{InferConfigError, KubeconfigError};
use thiserror::Error;

/// Failures while resolving [`crate::ClusterOptions`] into a client.
///
/// Request-time failures are reported as `event_store::ListWatchError`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid api server url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to load kubeconfig {path}: {source}")]
    KubeconfigFile {
        path: PathBuf,
        #[source]
        source: KubeconfigError,
    },

    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("no cluster configuration found: {0}")]
    Infer(#[from] InferConfigError),

    #[error("failed to create api client: {0}")]
    Client(#[from] kube::Error),
}
