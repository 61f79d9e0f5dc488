//! Connection settings for the cluster API server.

use std::path::PathBuf;
use std::time::Duration;

use http::Uri;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::error::ClientError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to reach the API server.
///
/// Resolution order: an explicit kubeconfig file, then the default
/// kubeconfig when a context is named, then a bare `apiserver` URL, then
/// `kube`'s inference (in-cluster service account or default kubeconfig).
/// A given `apiserver` always overrides the resolved server URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterOptions {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    /// Base URL, e.g. `https://10.0.0.1:443` or `http://127.0.0.1:8001`.
    pub apiserver: Option<String>,
    /// Skip server certificate verification.
    pub insecure: bool,
}

impl ClusterOptions {
    /// Build the `kube` configuration these options describe.
    pub async fn resolve(&self) -> Result<Config, ClientError> {
        let context = KubeConfigOptions {
            context: self.context.clone(),
            ..Default::default()
        };

        let mut config = match (&self.kubeconfig, &self.context, &self.apiserver) {
            (Some(path), _, _) => {
                let kubeconfig =
                    Kubeconfig::read_from(path).map_err(|source| ClientError::KubeconfigFile {
                        path: path.clone(),
                        source,
                    })?;
                Config::from_custom_kubeconfig(kubeconfig, &context)
                    .await
                    .map_err(|source| ClientError::KubeconfigFile {
                        path: path.clone(),
                        source,
                    })?
            }
            (None, Some(_), _) => Config::from_kubeconfig(&context).await?,
            (None, None, Some(server)) => Config::new(parse_url(server)?),
            (None, None, None) => Config::infer().await?,
        };

        if let Some(server) = &self.apiserver {
            config.cluster_url = parse_url(server)?;
        }
        if self.insecure {
            config.accept_invalid_certs = true;
        }
        config.connect_timeout = Some(CONNECT_TIMEOUT);
        Ok(config)
    }

    /// Resolve and create the client. Must be called inside a tokio runtime.
    pub async fn connect(&self) -> Result<Client, ClientError> {
        let config = self.resolve().await?;
        debug!(
            server = %config.cluster_url,
            insecure = config.accept_invalid_certs,
            "cluster config resolved"
        );
        Ok(Client::try_from(config)?)
    }
}

fn parse_url(server: &str) -> Result<Uri, ClientError> {
    let invalid = |reason: String| ClientError::InvalidUrl {
        url: server.to_string(),
        reason,
    };
    let uri = server.parse::<Uri>().map_err(|e| invalid(e.to_string()))?;
    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(other) => return Err(invalid(format!("unsupported scheme {other}"))),
        None => return Err(invalid("missing scheme".to_string())),
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(uri)
}
