//! # HTTP Server
//!
//! Probe and metrics endpoints:
//!
//! - `/status`, `/readiness`, `/liveness` - fixed `Ok` body
//! - `/metrics` - Prometheus metrics in text format
//! - `/stop` - answers `405`, stopping over HTTP is not supported
//!
//! All routes can be mounted under a prefix (`http.routePrefix`).

use crate::observability::metrics;
use anyhow::Context as _;
use axum::{http::StatusCode, response::IntoResponse, routing::any, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

/// Build the router, nested under `route_prefix` when it is not empty or `/`
pub fn router(route_prefix: &str) -> Router {
    let routes = Router::new()
        .route("/status", get(ok_handler))
        .route("/readiness", get(ok_handler))
        .route("/liveness", get(ok_handler))
        .route("/metrics", get(metrics_handler))
        .route("/stop", any(stop_handler));

    let app = match normalize_prefix(route_prefix) {
        Some(prefix) => Router::new().nest(&prefix, routes),
        None => routes,
    };

    app.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// `"api/"` -> `Some("/api")`, `""` and `"/"` -> `None`
fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}

/// Bind the HTTP listener
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, anyhow::Error> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;
    info!("HTTP server listening on {}", addr);
    Ok(listener)
}

/// Serve on an already bound listener until `cancel` fires
pub async fn start_server(
    listener: TcpListener,
    route_prefix: String,
    cancel: CancellationToken,
) -> Result<(), anyhow::Error> {
    let app = router(&route_prefix);

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn ok_handler() -> &'static str {
    "Ok\n"
}

async fn stop_handler() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, "Stop NotImplements\n")
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = metrics::gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}
