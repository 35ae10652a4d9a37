//! Reset and simulation control.

use crate::api::types::{error_response, json_response, ResetResponse, SimulationStatus};
use crate::server::GatewayState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// GET /reset
pub fn handle_reset(state: &GatewayState) -> Response<Full<Bytes>> {
    match state.reset.reset() {
        Ok(stats) => json_response(
            StatusCode::OK,
            &ResetResponse {
                message: "Logs and stats reset".to_string(),
                stats,
            },
        ),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string()),
    }
}

/// GET /simulation/toggle
pub fn handle_simulation_toggle(state: &GatewayState) -> Response<Full<Bytes>> {
    let status = if state.simulation.toggle() {
        "simulation_started"
    } else {
        "simulation_stopped"
    };
    json_response(
        StatusCode::OK,
        &SimulationStatus {
            status: status.to_string(),
        },
    )
}
