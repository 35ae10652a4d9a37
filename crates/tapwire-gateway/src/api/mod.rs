//! HTTP surface of the gateway.
//!
//! - `GET /logs`, `GET /stats`, `GET /reset`, `GET /simulation/toggle`
//! - `GET /`, `GET /health`, `GET /metrics`
//! - anything under the proxied prefix is forwarded upstream

pub mod handlers;
pub mod router;
pub mod types;

pub use router::{is_proxied, route_request};
