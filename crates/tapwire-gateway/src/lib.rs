//! Tapwire gateway: a transparent HTTP(S) interceptor that keeps a bounded
//! in-memory history of proxied traffic and serves it through a chunked
//! log API.

pub mod api;
pub mod config;
pub mod intercept;
pub mod metrics;
pub mod query;
pub mod reset;
pub mod server;
pub mod simulation;
pub mod store;

pub use config::Config;
pub use server::{GatewayServer, GatewayState};
