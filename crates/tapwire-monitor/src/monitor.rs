//! Consumer view of the gateway: the latest traffic per direction and the
//! most recent request/response contents.

use crate::api::{ApiError, Direction, LogRecord, LogSource, Stats};
use crate::buffer::{BoundedBuffer, ContentBuffers, DEFAULT_BUFFER_LIMIT};
use crate::chunk::{MergePolicy, ReassemblyError, Reassembler};
use crate::content::Content;
use crate::poller::{PollMode, PollTarget};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Reverse;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Reassembly(#[from] ReassemblyError),
}

/// Decides which log entries are intercepted traffic worth showing.
#[derive(Debug, Clone)]
pub struct TrafficFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for TrafficFilter {
    fn default() -> Self {
        Self {
            include: vec!["api2.cursor.sh".to_string(), "/api/".to_string()],
            exclude: vec!["/stats".to_string(), "/logs".to_string()],
        }
    }
}

impl TrafficFilter {
    pub fn accepts(&self, record: &LogRecord) -> bool {
        let url = record.url.as_str();
        if self.exclude.iter().any(|p| url.contains(p.as_str())) {
            return false;
        }
        self.include.iter().any(|p| url.contains(p.as_str()))
            || (record.method == "RESPONSE" && record.direction == Direction::Inbound)
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub chunk_limit: usize,
    pub buffer_limit: usize,
    pub merge_policy: MergePolicy,
    pub filter: TrafficFilter,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            chunk_limit: 10,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            merge_policy: MergePolicy::default(),
            filter: TrafficFilter::default(),
        }
    }
}

/// What one poll cycle observed
#[derive(Debug, Clone, Default)]
pub struct PollReport {
    /// Stats differ from the previous cycle
    pub changed: bool,
    /// Contents were re-fetched and reassembled successfully
    pub refreshed: bool,
    pub new_outbound: Option<Content>,
    pub new_inbound: Option<Content>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorView<'a> {
    pub stats: Option<Stats>,
    pub latest_outbound: Option<&'a Content>,
    pub latest_inbound: Option<&'a Content>,
    pub request: Option<&'a Content>,
    pub response: Option<&'a Content>,
    pub payload: Option<&'a Value>,
    pub error: Option<&'a str>,
}

pub struct Monitor<S> {
    source: S,
    reassembler: Reassembler,
    filter: TrafficFilter,
    buffers: ContentBuffers<Content>,
    stats: Option<Stats>,
    outbound: Vec<Content>,
    inbound: Vec<Content>,
    request: Option<Content>,
    response: Option<Content>,
    payload: Option<Value>,
    last_error: Option<String>,
    refresh_pending: bool,
    loaded: bool,
}

impl<S: LogSource> Monitor<S> {
    pub fn new(source: S, config: MonitorConfig) -> Self {
        Self {
            source,
            reassembler: Reassembler::new(config.chunk_limit, config.merge_policy),
            filter: config.filter,
            buffers: ContentBuffers::new(config.buffer_limit),
            stats: None,
            outbound: Vec::new(),
            inbound: Vec::new(),
            request: None,
            response: None,
            payload: None,
            last_error: None,
            refresh_pending: false,
            loaded: false,
        }
    }

    /// Run one poll cycle.
    ///
    /// Logs and stats are fetched together; the rest of the cycle only runs
    /// when the stats moved or `mode.force` is set. A failed reassembly keeps
    /// the previous contents.
    pub async fn poll_once(&mut self, mode: PollMode) -> Result<PollReport, MonitorError> {
        let fetched = tokio::try_join!(self.source.fetch_logs(), self.source.fetch_stats());
        let (logs, stats) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                if !mode.silent {
                    self.last_error = Some(e.to_string());
                }
                return Err(e.into());
            }
        };

        let changed = self.stats != Some(stats);
        self.stats = Some(stats);
        let mut report = PollReport {
            changed,
            ..PollReport::default()
        };
        if !changed && !mode.force && !self.refresh_pending {
            return Ok(report);
        }
        self.refresh_pending = false;

        let (outbound, inbound) = self.split(logs);
        if outbound.first().map(|c| &c.id) != self.outbound.first().map(|c| &c.id) {
            report.new_outbound = outbound.first().cloned();
        }
        if inbound.first().map(|c| &c.id) != self.inbound.first().map(|c| &c.id) {
            report.new_inbound = inbound.first().cloned();
        }
        self.outbound = outbound;
        self.inbound = inbound;

        match self.refresh_contents().await {
            Ok(()) => {
                report.refreshed = true;
                self.last_error = None;
            }
            Err(e) => {
                // Retry on the next poll even if the stats stay put
                self.refresh_pending = true;
                if mode.silent {
                    debug!("Content refresh failed: {}", e);
                } else {
                    warn!("Content refresh failed: {}", e);
                    self.last_error = Some(e.to_string());
                }
            }
        }
        self.loaded = true;
        Ok(report)
    }

    /// Reset the gateway and drop everything seen so far.
    pub async fn reset(&mut self) -> Result<Stats, MonitorError> {
        match self.source.reset().await {
            Ok(resp) => {
                info!("{}: {:?}", resp.message, resp.stats);
                self.outbound.clear();
                self.inbound.clear();
                self.request = None;
                self.response = None;
                self.payload = None;
                self.buffers.clear();
                self.last_error = None;
                self.stats = Some(resp.stats);
                self.refresh_pending = true;
                Ok(resp.stats)
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Filtered entries per direction, newest first.
    fn split(&self, logs: Vec<LogRecord>) -> (Vec<Content>, Vec<Content>) {
        let (mut outbound, mut inbound): (Vec<Content>, Vec<Content>) = logs
            .iter()
            .filter(|record| self.filter.accepts(record))
            .filter(|record| record.direction != Direction::Unknown)
            .map(Content::from)
            .partition(|content| content.direction == Direction::Outbound);
        outbound.sort_by_key(|c| Reverse(c.timestamp));
        inbound.sort_by_key(|c| Reverse(c.timestamp));
        (outbound, inbound)
    }

    async fn refresh_contents(&mut self) -> Result<(), ReassemblyError> {
        let first = self
            .source
            .fetch_chunk(0, self.reassembler.limit(), None)
            .await
            .map_err(|source| ReassemblyError::Fetch { index: 0, source })?;
        let payload = self.reassembler.reassemble(&self.source, first).await?;

        let records: Vec<LogRecord> = records_in(&payload)
            .into_iter()
            .filter(|record| self.filter.accepts(record))
            .collect();
        let latest = |direction: Direction| {
            // newest first on the wire; reversed so ties go to the newest
            records
                .iter()
                .rev()
                .filter(|r| r.direction == direction)
                .max_by_key(|r| r.timestamp)
                .map(Content::from)
        };

        self.request = adopt(&mut self.buffers.requests, latest(Direction::Outbound));
        self.response = adopt(&mut self.buffers.responses, latest(Direction::Inbound));
        self.payload = Some(payload);
        Ok(())
    }

    pub fn stats(&self) -> Option<Stats> {
        self.stats
    }

    /// Outbound entries of the last refresh, newest first
    pub fn outbound(&self) -> &[Content] {
        &self.outbound
    }

    /// Inbound entries of the last refresh, newest first
    pub fn inbound(&self) -> &[Content] {
        &self.inbound
    }

    pub fn request(&self) -> Option<&Content> {
        self.request.as_ref()
    }

    pub fn response(&self) -> Option<&Content> {
        self.response.as_ref()
    }

    /// Reassembled payload of the last successful refresh
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn buffers(&self) -> &ContentBuffers<Content> {
        &self.buffers
    }

    /// True once a cycle has made it past the change check
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn view(&self) -> MonitorView<'_> {
        MonitorView {
            stats: self.stats,
            latest_outbound: self.outbound.first(),
            latest_inbound: self.inbound.first(),
            request: self.request.as_ref(),
            response: self.response.as_ref(),
            payload: self.payload.as_ref(),
            error: self.last_error.as_deref(),
        }
    }
}

/// Record the newest content, or fall back to the buffered one.
fn adopt(buffer: &mut BoundedBuffer<Content>, latest: Option<Content>) -> Option<Content> {
    match latest {
        Some(content) => {
            let seen = buffer
                .latest()
                .is_some_and(|item| item.content.id == content.id);
            if !seen {
                buffer.push(content.clone());
            }
            Some(content)
        }
        None => buffer.latest().map(|item| item.content.clone()),
    }
}

/// Records of a reassembled payload (a log page or a bare sequence).
fn records_in(payload: &Value) -> Vec<LogRecord> {
    let items = match payload {
        Value::Object(map) => map.get("logs").and_then(Value::as_array),
        Value::Array(items) => Some(items),
        _ => None,
    };
    items
        .into_iter()
        .flatten()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

#[async_trait]
impl<S: LogSource + 'static> PollTarget for Monitor<S> {
    type Error = MonitorError;

    async fn poll(&mut self, mode: PollMode) -> Result<bool, MonitorError> {
        let report = self.poll_once(mode).await?;
        if let Some(content) = &report.new_outbound {
            info!("→ {} {} ({})", content.method, content.url, content.kind);
        }
        if let Some(content) = &report.new_inbound {
            info!("← {} {} ({})", content.status, content.url, content.kind);
        }
        if report.changed {
            if let Some(stats) = self.stats {
                info!(
                    "Traffic: {} outgoing, {} incoming",
                    stats.outgoing, stats.incoming
                );
            }
        }
        Ok(report.changed)
    }
}
