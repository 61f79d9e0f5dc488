//! Scrape endpoints.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Event metrics of every store |
//! | GET | `/telemetry` | The exporter's own list/watch instrumentation |
//! | GET | `/healthz` | Liveness |

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::warn;

use event_store::{Event, MetricsStore, render_all};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared state for the scrape handlers.
#[derive(Clone)]
pub struct ServerState {
    pub stores: Arc<[Arc<MetricsStore<Event>>]>,
    pub telemetry: Registry,
}

impl ServerState {
    pub fn new(stores: Vec<Arc<MetricsStore<Event>>>, telemetry: Registry) -> Self {
        Self {
            stores: stores.into(),
            telemetry,
        }
    }
}

pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/telemetry", get(telemetry))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// GET /metrics
async fn metrics(State(state): State<ServerState>) -> impl IntoResponse {
    let body = render_all(&state.stores);
    (StatusCode::OK, [("content-type", TEXT_FORMAT)], body)
}

/// GET /telemetry
async fn telemetry(State(state): State<ServerState>) -> impl IntoResponse {
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&state.telemetry.gather(), &mut buf) {
        warn!(error = %e, "failed to encode telemetry");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            e.to_string(),
        )
            .into_response();
    }
    let body = String::from_utf8_lossy(&buf).into_owned();
    (StatusCode::OK, [("content-type", TEXT_FORMAT)], body).into_response()
}

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}
