//! kube-event-exporter: watches cluster events and exports them as metrics.
//!
//! # Usage
//!
//! ```text
//! kube-event-exporter --resources pods,deployments --namespaces default --port 8080
//! kube-event-exporter --config /etc/kube-event-exporter.toml --shard 1 --total-shards 3
//! ```

use std::sync::Arc;

use clap::Parser;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::{info, warn};

use event_client::ApiClient;
use event_metrics::AllowDenyList;
use event_store::Builder;
use kube_event_exporter::{Cli, ExporterConfig, ServerState, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ExporterConfig::load(&cli)?;
    init_tracing(config.log_json);
    run(config).await
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,event_store=debug"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(config: ExporterConfig) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "kube-event-exporter starting");

    let allow_deny = AllowDenyList::new(&config.metric_allowlist, &config.metric_denylist)?;
    info!(status = %allow_deny.status(), "metric allow/deny list");

    let options = config.cluster_options();
    let client = ApiClient::new(options.connect().await?);
    info!(
        kubeconfig = ?options.kubeconfig,
        context = ?options.context,
        apiserver = ?options.apiserver,
        "api client initialized"
    );

    // ── Stores and reflectors ──────────────────────────────────

    let telemetry = Registry::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let built = Builder::new()
        .with_enabled_resources(&config.resources)?
        .with_namespaces(config.namespaces.iter().cloned())
        .with_sharding(config.shard, config.total_shards)
        .with_allow_deny_list(Arc::new(allow_deny))
        .with_list_watch_factory(Arc::new(client))
        .with_metrics(&telemetry)?
        .with_reflector_config(config.reflector_config())
        .with_shutdown(shutdown_rx)
        .build()?;

    // ── Scrape server ──────────────────────────────────────────

    let router = build_router(ServerState::new(built.stores.clone(), telemetry));
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(addr = %listener.local_addr()?, "scrape server starting");

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for reflectors.
    built.join().await;

    info!("kube-event-exporter stopped");
    Ok(())
}
