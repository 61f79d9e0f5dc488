//! Exporter configuration: TOML file plus command-line overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use serde::{Deserialize, Serialize};

use event_client::ClusterOptions;
use event_store::{ReflectorConfig, available_resources};

#[derive(Parser, Debug, Default)]
#[command(name = "kube-event-exporter", about = "Exports cluster events as Prometheus metrics")]
pub struct Cli {
    /// TOML configuration file. Flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Comma-separated resource kinds to export events for.
    #[arg(long, value_delimiter = ',')]
    pub resources: Option<Vec<String>>,

    /// Comma-separated namespaces to watch. Empty means all namespaces.
    #[arg(long, value_delimiter = ',')]
    pub namespaces: Option<Vec<String>>,

    /// Index of this replica among `--total-shards`.
    #[arg(long)]
    pub shard: Option<u32>,

    /// Number of replicas sharing the event population.
    #[arg(long)]
    pub total_shards: Option<u32>,

    /// Comma-separated regexes of metric families to export.
    #[arg(long, value_delimiter = ',')]
    pub metric_allowlist: Option<Vec<String>>,

    /// Comma-separated regexes of metric families to drop.
    #[arg(long, value_delimiter = ',')]
    pub metric_denylist: Option<Vec<String>>,

    /// Kubeconfig file. Defaults to in-cluster configuration or the
    /// default kubeconfig.
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use instead of the current one.
    #[arg(long)]
    pub context: Option<String>,

    /// API server URL. Overrides the server from the kubeconfig.
    #[arg(long)]
    pub apiserver: Option<String>,

    /// Skip API server certificate verification.
    #[arg(long)]
    pub insecure_skip_tls_verify: bool,

    /// Full relist interval in seconds. 0 disables resync.
    #[arg(long)]
    pub resync_period_secs: Option<u64>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

/// Resolved exporter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub host: String,
    pub port: u16,
    pub resources: Vec<String>,
    pub namespaces: Vec<String>,
    pub shard: u32,
    pub total_shards: u32,
    pub metric_allowlist: Vec<String>,
    pub metric_denylist: Vec<String>,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub apiserver: Option<String>,
    pub insecure_skip_tls_verify: bool,
    pub resync_period_secs: Option<u64>,
    pub log_json: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            resources: available_resources().into_iter().map(String::from).collect(),
            namespaces: vec![String::new()],
            shard: 0,
            total_shards: 1,
            metric_allowlist: Vec::new(),
            metric_denylist: Vec::new(),
            kubeconfig: None,
            context: None,
            apiserver: None,
            insecure_skip_tls_verify: false,
            resync_period_secs: None,
            log_json: false,
        }
    }
}

impl ExporterConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: ExporterConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Defaults, then the `--config` file if any, then flags.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let base = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = base.merge(cli);
        config.validate()?;
        Ok(config)
    }

    /// Apply every flag that was given on the command line.
    pub fn merge(mut self, cli: &Cli) -> Self {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(resources) = &cli.resources {
            self.resources = resources.clone();
        }
        if let Some(namespaces) = &cli.namespaces {
            self.namespaces = namespaces.clone();
        }
        if let Some(shard) = cli.shard {
            self.shard = shard;
        }
        if let Some(total) = cli.total_shards {
            self.total_shards = total;
        }
        if let Some(allow) = &cli.metric_allowlist {
            self.metric_allowlist = allow.clone();
        }
        if let Some(deny) = &cli.metric_denylist {
            self.metric_denylist = deny.clone();
        }
        if cli.kubeconfig.is_some() {
            self.kubeconfig = cli.kubeconfig.clone();
        }
        if cli.context.is_some() {
            self.context = cli.context.clone();
        }
        if cli.apiserver.is_some() {
            self.apiserver = cli.apiserver.clone();
        }
        if cli.resync_period_secs.is_some() {
            self.resync_period_secs = cli.resync_period_secs;
        }
        self.insecure_skip_tls_verify |= cli.insecure_skip_tls_verify;
        self.log_json |= cli.log_json;
        self
    }

    /// Checks no downstream constructor makes. Shard ranges are checked by
    /// `Sharding::new` and allow/deny exclusivity by `AllowDenyList::new`.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.resources.is_empty() {
            bail!("at least one resource must be enabled");
        }
        Ok(())
    }

    pub fn reflector_config(&self) -> ReflectorConfig {
        ReflectorConfig {
            resync_period: self
                .resync_period_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            ..ReflectorConfig::default()
        }
    }

    pub fn cluster_options(&self) -> ClusterOptions {
        ClusterOptions {
            kubeconfig: self.kubeconfig.clone(),
            context: self.context.clone(),
            apiserver: self.apiserver.clone(),
            insecure: self.insecure_skip_tls_verify,
        }
    }
}
