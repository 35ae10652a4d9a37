//! Traffic recording around proxied calls.

use crate::metrics;
use crate::store::{TrafficRecord, TrafficSink};
use hyper::HeaderMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Records the two halves of every proxied call into a [`TrafficSink`].
///
/// Recording never fails the call: sink errors are logged, counted and
/// dropped.
#[derive(Clone)]
pub struct Interceptor {
    sink: Arc<dyn TrafficSink>,
    /// Captured body copies are cut at this many bytes
    capture_limit: usize,
}

impl Interceptor {
    pub fn new(sink: Arc<dyn TrafficSink>, capture_limit: usize) -> Self {
        Self {
            sink,
            capture_limit,
        }
    }

    /// Record the outbound half, right before the request leaves.
    pub fn on_request(&self, method: &str, url: &str, headers: &HeaderMap, body: &[u8]) {
        let record = TrafficRecord::outbound(method, url, body.len() as u64)
            .with_headers(header_map(headers))
            .with_body_bytes(body, self.capture_limit);
        self.record(record);
    }

    /// Record the inbound half, once the response body is complete.
    pub fn on_response(&self, url: &str, status: u16, headers: &HeaderMap, body: &[u8]) {
        let record = TrafficRecord::inbound(url, status, body.len() as u64)
            .with_headers(header_map(headers))
            .with_body_bytes(body, self.capture_limit);
        self.record(record);
    }

    /// Record an inbound entry for a call that never produced a response.
    pub fn on_failure(&self, url: &str, status: u16, message: &str) {
        let record = TrafficRecord::inbound(url, status, message.len() as u64)
            .with_body_bytes(message.as_bytes(), self.capture_limit);
        self.record(record);
    }

    /// Hand a prepared record to the sink.
    pub fn record(&self, record: TrafficRecord) {
        let direction = record.direction;
        debug!(
            "Recording {} {} {} ({} bytes)",
            direction.as_str(),
            record.method,
            record.url,
            record.size
        );
        match self.sink.record(record) {
            Ok(()) => metrics::record_traffic(direction.as_str()),
            Err(e) => {
                warn!("Dropping {} traffic record: {}", direction.as_str(), e);
                metrics::record_sink_failure();
            }
        }
    }
}

/// Flatten a header map; repeated names are joined with `, `.
pub fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers.iter() {
        let value = String::from_utf8_lossy(value.as_bytes());
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    map
}
