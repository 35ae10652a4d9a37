//! System handlers: index, health, metrics.

use crate::api::types::{build_response, json_response};
use crate::metrics;
use crate::server::GatewayState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// GET / - endpoint index and effective settings
pub fn handle_root(state: &GatewayState) -> Response<Full<Bytes>> {
    let config = &state.config;
    let body = serde_json::json!({
        "name": "tapwire-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "logs": "/logs",
            "chunkedLogs": "/logs?limit=10&bodies=true&chunk=0&chunkId=",
            "stats": "/stats",
            "reset": "/reset",
            "simulationToggle": "/simulation/toggle",
            "health": "/health",
            "metrics": "/metrics"
        },
        "config": {
            "upstream": state.forwarder.upstream_base(),
            "pathPrefix": config.upstream.path_prefix,
            "httpPort": config.listen.port,
            "httpsPort": config.listen.tls.as_ref().map(|_| config.listen.https_port),
            "maxLogs": config.store.max_logs,
            "simulation": state.simulation.is_running()
        }
    });
    json_response(StatusCode::OK, &body)
}

/// GET /health - Health check
pub fn handle_health() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &serde_json::json!({"status": "ok"}))
}

/// GET /metrics - Prometheus metrics
pub fn handle_metrics(state: &GatewayState) -> Response<Full<Bytes>> {
    metrics::set_store_size(state.store.len());
    build_response(
        StatusCode::OK,
        "text/plain; version=0.0.4",
        metrics::collect_metrics(),
    )
}
