//! Request forwarding with traffic capture.

use super::client::HttpClient;
use super::interceptor::Interceptor;
use super::rewrite::PathRewriter;
use crate::api::types::error_response;
use crate::config::UpstreamConfig;
use crate::metrics;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderName, HeaderValue, CONNECTION, HOST, TRANSFER_ENCODING};
use hyper::{HeaderMap, Request, Response, StatusCode};
use std::fmt::Display;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Marks responses that came from the upstream
pub const PROXIED_HEADER: &str = "x-tapwire-proxied";

/// Forwards proxied calls to the upstream and records both halves.
pub struct Forwarder {
    client: HttpClient,
    upstream_base: String,
    rewriter: PathRewriter,
    interceptor: Interceptor,
}

impl Forwarder {
    pub fn new(
        client: HttpClient,
        upstream: &UpstreamConfig,
        interceptor: Interceptor,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            upstream_base: upstream.base_url().to_string(),
            rewriter: PathRewriter::new(&upstream.path_rewrite)?,
            interceptor,
        })
    }

    pub fn upstream_base(&self) -> &str {
        &self.upstream_base
    }

    /// Forward one call with buffered request and response bodies.
    ///
    /// Exactly one outbound and one inbound record are produced per call.
    /// Transport failures become a 502 for the caller and an inbound record
    /// carrying that status.
    pub async fn forward<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        let method = parts.method.clone();
        let url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_string();

        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("Failed to read request body for {} {}: {}", method, url, e);
                self.interceptor
                    .on_request(method.as_str(), &url, &parts.headers, &[]);
                return self.fail(&url, StatusCode::BAD_REQUEST, "Failed to read request body");
            }
        };

        let target = format!("{}{}", self.upstream_base, self.rewriter.apply(&url));
        debug!("Forwarding {} {} to: {}", method, url, target);

        let mut upstream_req = Request::builder().method(method.clone()).uri(&target);
        for (key, value) in forwardable(&parts.headers) {
            upstream_req = upstream_req.header(key, value);
        }

        self.interceptor
            .on_request(method.as_str(), &url, &parts.headers, &body_bytes);

        let upstream_req = match upstream_req.body(Full::new(body_bytes)) {
            Ok(req) => req,
            Err(e) => {
                warn!("Cannot build upstream request for {}: {}", target, e);
                return self.fail(&url, StatusCode::BAD_REQUEST, "Invalid upstream request");
            }
        };

        let start = Instant::now();
        match self.client.request(upstream_req).await {
            Ok(upstream_response) => {
                let (mut parts, body) = upstream_response.into_parts();
                let body_bytes = match body.collect().await {
                    Ok(collected) => collected.to_bytes(),
                    Err(e) => {
                        error!("Failed to collect upstream response body: {}", e);
                        metrics::record_upstream_error();
                        return self.fail(&url, StatusCode::BAD_GATEWAY, "Bad Gateway");
                    }
                };
                let status = parts.status.as_u16();
                metrics::record_upstream_duration(
                    method.as_str(),
                    status,
                    start.elapsed().as_secs_f64() * 1000.0,
                );
                self.interceptor
                    .on_response(&url, status, &parts.headers, &body_bytes);

                parts.headers.remove(TRANSFER_ENCODING);
                parts.headers.remove(CONNECTION);
                parts.headers.insert(
                    HeaderName::from_static(PROXIED_HEADER),
                    HeaderValue::from_static("true"),
                );
                Response::from_parts(parts, Full::new(body_bytes))
            }
            Err(e) => {
                error!("Failed to forward request to upstream {}: {}", target, e);
                metrics::record_upstream_error();
                self.fail(&url, StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
        }
    }

    fn fail(&self, url: &str, status: StatusCode, message: &str) -> Response<Full<Bytes>> {
        self.interceptor.on_failure(url, status.as_u16(), message);
        error_response(status, message)
    }
}

/// Request headers passed on to the upstream. `host` is re-derived from the
/// target URI; framing headers are recomputed for the buffered body.
fn forwardable(headers: &HeaderMap) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
    headers
        .iter()
        .filter(|(key, _)| *key != HOST && *key != TRANSFER_ENCODING && *key != CONNECTION)
}
