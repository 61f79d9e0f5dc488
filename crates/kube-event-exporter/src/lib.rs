//! kube-event-exporter: serves cluster events as Prometheus metrics.
//!
//! The binary assembles the pieces:
//! - Configuration (TOML file + flags)
//! - API client (event-client)
//! - Stores and reflectors (event-store)
//! - Scrape server (axum)

pub mod config;
pub mod server;

pub use config::{Cli, ExporterConfig};
pub use server::{ServerState, build_router};
