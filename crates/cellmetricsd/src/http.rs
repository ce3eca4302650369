//! Local scrape endpoint.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition of the latest emissions |
//! | GET | `/healthz` | Liveness probe |

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use cellmetrics_metrics::{GaugeRegistry, render_prometheus};

/// Build the exposition router over `registry`.
pub fn build_router(registry: Arc<GaugeRegistry>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .route("/healthz", get(healthz))
        .with_state(registry)
}

async fn prometheus_metrics(State(registry): State<Arc<GaugeRegistry>>) -> impl IntoResponse {
    let body = render_prometheus(&registry.snapshot());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

async fn healthz() -> &'static str {
    "ok"
}
