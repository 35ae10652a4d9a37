//! Traffic log handlers: `/logs` and `/stats`.

use crate::api::types::{error_response, json_response};
use crate::query::{LogsQuery, QueryError};
use crate::server::GatewayState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// GET /logs - plain array, or a chunk envelope when `chunk`/`chunkId` is set
pub fn handle_logs(state: &GatewayState, query: Option<&str>) -> Response<Full<Bytes>> {
    let query = match LogsQuery::parse(query) {
        Ok(query) => query,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    state.reset.ensure_seeded();

    if !query.wants_envelope() {
        return json_response(StatusCode::OK, &state.query.list(&query));
    }
    match state.query.chunk(&query) {
        Ok(envelope) => json_response(StatusCode::OK, &envelope),
        Err(e @ QueryError::ChunkSetExpired { .. }) => {
            error_response(StatusCode::GONE, &e.to_string())
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

/// GET /stats - lifetime counters
pub fn handle_stats(state: &GatewayState) -> Response<Full<Bytes>> {
    state.reset.ensure_seeded();
    json_response(StatusCode::OK, &state.store.stats())
}
