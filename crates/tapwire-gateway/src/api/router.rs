//! Route dispatch for the gateway.
//!
//! Paths under the proxied prefix go to the upstream; everything else is
//! the control surface and is never recorded.

use crate::api::handlers::{control, logs, system};
use crate::api::types::{not_found, preflight};
use crate::server::GatewayState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Method, Request, Response};
use std::fmt::Display;
use tracing::debug;

/// Main request router
pub async fn route_request<B>(req: Request<B>, state: &GatewayState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    if is_proxied(req.uri().path(), &state.config.upstream.path_prefix) {
        return state.forwarder.forward(req).await;
    }

    let method = req.method().clone();
    let path = req.uri().path();
    let query = req.uri().query();
    debug!("Control API: {} {}", method, path);

    match (&method, path) {
        (&Method::OPTIONS, _) => preflight(),
        (&Method::GET, "/") => system::handle_root(state),
        (&Method::GET, "/health") => system::handle_health(),
        (&Method::GET, "/metrics") => system::handle_metrics(state),
        (&Method::GET, "/logs") => logs::handle_logs(state, query),
        (&Method::GET, "/stats") => logs::handle_stats(state),
        (&Method::GET, "/reset") => control::handle_reset(state),
        (&Method::GET, "/simulation/toggle") => control::handle_simulation_toggle(state),
        _ => not_found(),
    }
}

/// `/api` matches `/api` and `/api/...` but not `/apix`. A bare `/` proxies
/// nothing.
pub fn is_proxied(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::BodyExt;
    use hyper::StatusCode;

    fn state() -> GatewayState {
        let mut config = Config::default();
        config.upstream.url = "http://127.0.0.1:1".to_string();
        config.seed.pairs = 3;
        GatewayState::new(config).unwrap()
    }

    fn get(uri: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn json(resp: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_is_proxied() {
        assert!(is_proxied("/api", "/api"));
        assert!(is_proxied("/api/v1/models", "/api"));
        assert!(is_proxied("/api/v1/models", "/api/"));
        assert!(!is_proxied("/apix", "/api"));
        assert!(!is_proxied("/logs", "/api"));
        assert!(!is_proxied("/logs", "/"));
        assert!(!is_proxied("/anything", ""));
    }

    #[tokio::test]
    async fn test_stats_auto_seeds() {
        let state = state();
        let resp = route_request(get("/stats"), &state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            json(resp).await,
            serde_json::json!({"incoming": 3, "outgoing": 3})
        );
    }

    #[tokio::test]
    async fn test_logs_plain_array() {
        let state = state();
        let body = json(route_request(get("/logs"), &state).await).await;
        let logs = body.as_array().unwrap();
        assert_eq!(logs.len(), 6);
        let timestamps: Vec<i64> = logs
            .iter()
            .map(|l| l["timestamp"].as_i64().unwrap())
            .collect();
        assert!(timestamps.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_logs_chunk_out_of_range() {
        let state = state();
        let resp = route_request(get("/logs?limit=2&bodies=true&chunk=7&chunkId="), &state).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json(resp).await,
            serde_json::json!({"error": "chunk 7 out of range (total 3)"})
        );
    }

    #[tokio::test]
    async fn test_logs_bad_parameter() {
        let state = state();
        let resp = route_request(get("/logs?chunk=first"), &state).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reset_returns_message_and_stats() {
        let state = state();
        let body = json(route_request(get("/reset"), &state).await).await;
        assert!(body["message"].is_string());
        assert_eq!(body["stats"], serde_json::json!({"incoming": 3, "outgoing": 3}));
    }

    #[tokio::test]
    async fn test_simulation_toggle() {
        let state = state();
        let body = json(route_request(get("/simulation/toggle"), &state).await).await;
        assert_eq!(body["status"], "simulation_started");
        let body = json(route_request(get("/simulation/toggle"), &state).await).await;
        assert_eq!(body["status"], "simulation_stopped");
    }

    #[tokio::test]
    async fn test_control_plane_is_not_recorded() {
        let state = state();
        route_request(get("/health"), &state).await;
        route_request(get("/metrics"), &state).await;
        route_request(get("/nope"), &state).await;
        assert!(state.store.is_pristine());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let state = state();
        let resp = route_request(get("/nope"), &state).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_proxied_path_reaches_forwarder() {
        let state = state();
        let resp = route_request(get("/api/v1/models"), &state).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(state.store.stats().outgoing, 1);
        assert_eq!(state.store.stats().incoming, 1);
    }
}
