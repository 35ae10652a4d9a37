//! Traffic interception.
//!
//! Everything between a client request arriving under the proxied prefix
//! and the upstream response going back out.
//!
//! # Module Structure
//!
//! - `interceptor` - Records outbound/inbound halves into a `TrafficSink`
//! - `forwarding` - Buffered forwarding to the upstream
//! - `rewrite` - Regex path rewriting
//! - `client` - Pooled upstream HTTP(S) client
//! - `tls` - Listener certificates and the development no-op verifier
//! - `network` - Listener sockets

mod client;
mod forwarding;
mod interceptor;
mod network;
mod rewrite;
mod tls;

pub use client::{create_http_client, HttpClient};
pub use forwarding::{Forwarder, PROXIED_HEADER};
pub use interceptor::{header_map, Interceptor};
pub use network::create_reusable_listener;
pub use rewrite::PathRewriter;
pub use tls::{create_tls_acceptor, crypto_provider, NoVerifier};
