//! Chunked Query Service.
//!
//! Serves `/logs` either as a plain most-recent-first array or, when the
//! caller asks for a chunk, as a [`ChunkEnvelope`] over a pinned snapshot.
//! A `chunkId` pins one snapshot so every chunk of a logical query sees the
//! same membership, even while new traffic keeps arriving.

use crate::config::QueryConfig;
use crate::store::{LogStore, Snapshot, TrafficRecord};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("chunk {index} out of range (total {total})")]
    ChunkOutOfRange { index: usize, total: usize },
    #[error("chunk set '{chunk_id}' expired; restart from chunk 0 without a chunkId")]
    ChunkSetExpired { chunk_id: String },
    #[error("invalid value '{value}' for query parameter '{name}'")]
    InvalidParameter { name: &'static str, value: String },
}

/// Parameters accepted by `GET /logs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogsQuery {
    pub limit: Option<usize>,
    pub bodies: bool,
    pub chunk: Option<usize>,
    pub chunk_id: Option<String>,
}

impl LogsQuery {
    /// Parse a raw query string. Unknown parameters are ignored.
    pub fn parse(query: Option<&str>) -> Result<Self, QueryError> {
        let mut params = Self::default();
        let Some(query) = query else {
            return Ok(params);
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
            let value = urlencoding::decode(raw)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            match key {
                "limit" => params.limit = Some(parse_number("limit", &value)?),
                "chunk" => params.chunk = Some(parse_number("chunk", &value)?),
                "bodies" => params.bodies = matches!(value.as_str(), "true" | "1"),
                "chunkId" if !value.is_empty() => params.chunk_id = Some(value),
                _ => {}
            }
        }
        Ok(params)
    }

    /// A chunk index or pinning token switches the answer to an envelope.
    pub fn wants_envelope(&self) -> bool {
        self.chunk.is_some() || self.chunk_id.is_some()
    }
}

fn parse_number(name: &'static str, value: &str) -> Result<usize, QueryError> {
    value.parse().map_err(|_| QueryError::InvalidParameter {
        name,
        value: value.to_string(),
    })
}

/// A record as served by `/logs`, with the load-shedding flags.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(flatten)]
    pub record: TrafficRecord,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub body_omitted: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub headers_omitted: bool,
}

/// `data` of a chunk envelope.
#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub logs: Vec<LogEntry>,
    /// Records in the pinned snapshot
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEnvelope {
    pub chunked: bool,
    pub chunk_id: String,
    pub current_chunk: usize,
    pub total_chunks: usize,
    pub data: LogPage,
}

/// Ids of dropped pins remembered so a stale `chunkId` is refused.
const RETIRED_PIN_IDS: usize = 256;

struct Pin {
    snapshot: Arc<Snapshot>,
    created: Instant,
}

#[derive(Default)]
struct PinTable {
    live: HashMap<String, Pin>,
    retired: VecDeque<String>,
}

impl PinTable {
    fn retire(&mut self, chunk_id: String) {
        self.live.remove(&chunk_id);
        if self.retired.len() >= RETIRED_PIN_IDS {
            self.retired.pop_front();
        }
        self.retired.push_back(chunk_id);
    }

    fn is_retired(&self, chunk_id: &str) -> bool {
        self.retired.iter().any(|id| id == chunk_id)
    }
}

pub struct QueryService {
    store: Arc<LogStore>,
    config: QueryConfig,
    pins: Mutex<PinTable>,
}

impl QueryService {
    pub fn new(store: Arc<LogStore>, config: QueryConfig) -> Self {
        Self {
            store,
            config,
            pins: Mutex::new(PinTable::default()),
        }
    }

    /// Plain `/logs` answer: the most recent `limit` records (all when unset).
    pub fn list(&self, query: &LogsQuery) -> Vec<LogEntry> {
        let limit = query.limit.map(|l| self.clamp_limit(l));
        let snapshot = self.store.snapshot(limit);
        self.render(&snapshot.records, query.bodies)
    }

    /// Serve one chunk of a pinned snapshot.
    pub fn chunk(&self, query: &LogsQuery) -> Result<ChunkEnvelope, QueryError> {
        let limit = self.clamp_limit(query.limit.unwrap_or(self.config.default_limit));
        let index = query.chunk.unwrap_or(0);
        let (chunk_id, supplied) = match &query.chunk_id {
            Some(id) => (id.clone(), true),
            None => (uuid::Uuid::new_v4().to_string(), false),
        };

        let snapshot = self.pinned(&chunk_id, supplied, index)?;
        let total = snapshot.records.len();
        let total_chunks = total.div_ceil(limit).max(1);
        if index >= total_chunks {
            return Err(QueryError::ChunkOutOfRange {
                index,
                total: total_chunks,
            });
        }

        let offset = index * limit;
        let end = (offset + limit).min(total);
        let logs = self.render(&snapshot.records[offset.min(total)..end], query.bodies);
        debug!(
            "Serving chunk {}/{} of {} ({} records)",
            index + 1,
            total_chunks,
            chunk_id,
            logs.len()
        );

        Ok(ChunkEnvelope {
            chunked: total_chunks > 1,
            chunk_id,
            current_chunk: index,
            total_chunks,
            data: LogPage {
                logs,
                total,
                offset,
                limit,
            },
        })
    }

    pub fn pinned_count(&self) -> usize {
        self.pins.lock().live.len()
    }

    fn clamp_limit(&self, limit: usize) -> usize {
        limit.clamp(1, self.store.capacity())
    }

    /// Snapshot pinned under `chunk_id`.
    ///
    /// A fresh snapshot is pinned only when the set starts here: a minted
    /// id, or a caller id at chunk 0 that was never pinned before. A caller
    /// id whose pin expired or predates the last reset is refused, so a
    /// client never stitches chunks from two different snapshots.
    fn pinned(
        &self,
        chunk_id: &str,
        supplied: bool,
        index: usize,
    ) -> Result<Arc<Snapshot>, QueryError> {
        let ttl = Duration::from_secs(self.config.pin_ttl_secs);
        let epoch = self.store.epoch();
        let mut pins = self.pins.lock();

        let stale: Vec<String> = pins
            .live
            .iter()
            .filter(|(_, pin)| pin.created.elapsed() >= ttl || pin.snapshot.epoch != epoch)
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            debug!("Dropping pin {}", id);
            pins.retire(id);
        }

        if let Some(pin) = pins.live.get(chunk_id) {
            return Ok(Arc::clone(&pin.snapshot));
        }
        if supplied && (index > 0 || pins.is_retired(chunk_id)) {
            return Err(QueryError::ChunkSetExpired {
                chunk_id: chunk_id.to_string(),
            });
        }

        while pins.live.len() >= self.config.max_pins.max(1) {
            let oldest = pins
                .live
                .iter()
                .min_by_key(|(_, pin)| pin.created)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => pins.retire(id),
                None => break,
            }
        }

        let snapshot = Arc::new(self.store.snapshot(None));
        pins.live.insert(
            chunk_id.to_string(),
            Pin {
                snapshot: Arc::clone(&snapshot),
                created: Instant::now(),
            },
        );
        Ok(snapshot)
    }

    /// Apply body inclusion and the inline/page budgets.
    fn render(&self, records: &[Arc<TrafficRecord>], bodies: bool) -> Vec<LogEntry> {
        let mut budget = self.config.max_page_bytes;
        records
            .iter()
            .map(|record| {
                if !bodies {
                    return LogEntry {
                        record: record.summary(),
                        body_omitted: false,
                        headers_omitted: false,
                    };
                }

                let mut entry = LogEntry {
                    record: TrafficRecord::clone(record),
                    body_omitted: false,
                    headers_omitted: false,
                };
                let body_len = entry.record.body.as_ref().map_or(0, String::len);
                if body_len > self.config.max_inline_body_bytes {
                    strip_body(&mut entry);
                }

                let cost = entry_cost(&entry.record);
                if cost > budget {
                    budget = 0;
                    if entry.record.body.is_some() {
                        strip_body(&mut entry);
                    }
                    if entry.record.headers.take().is_some() {
                        entry.headers_omitted = true;
                    }
                } else {
                    budget -= cost;
                }
                entry
            })
            .collect()
    }
}

fn strip_body(entry: &mut LogEntry) {
    entry.record.body = None;
    entry.record.body_encoding = None;
    entry.record.body_truncated = false;
    entry.body_omitted = true;
}

/// Bytes of body and header text an entry adds to a page.
fn entry_cost(record: &TrafficRecord) -> usize {
    let body = record.body.as_ref().map_or(0, String::len);
    let headers = record.headers.as_ref().map_or(0, |headers| {
        headers.iter().map(|(k, v)| k.len() + v.len()).sum()
    });
    body + headers
}
