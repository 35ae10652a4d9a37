//! Chunk reassembly.
//!
//! The gateway splits large log queries into envelopes that share a
//! `chunkId`. Given the first envelope, [`Reassembler`] fetches the rest
//! concurrently and merges them back into a single payload. Each chunk's
//! `data` is classified into a [`ChunkShape`] once, before merging.

use crate::api::ApiError;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// One segment of a chunked `/logs` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEnvelope {
    #[serde(default)]
    pub chunked: bool,
    #[serde(default)]
    pub chunk_id: Option<String>,
    #[serde(default)]
    pub current_chunk: usize,
    #[serde(default = "single_chunk")]
    pub total_chunks: usize,
    #[serde(default)]
    pub data: Value,
}

fn single_chunk() -> usize {
    1
}

/// Page metadata that must agree across every chunk of one snapshot
const SNAPSHOT_FIELDS: [&str; 2] = ["total", "limit"];

fn is_log_page(data: &Value) -> bool {
    data.get("logs").is_some_and(Value::is_array)
}

/// `field` of a log page; other payload shapes carry no page metadata.
fn snapshot_field<'a>(data: &'a Value, field: &str) -> Option<&'a Value> {
    if is_log_page(data) {
        data.get(field)
    } else {
        None
    }
}

#[derive(Error, Debug)]
pub enum ReassemblyError {
    #[error("failed to fetch chunk {index}: {source}")]
    Fetch {
        index: usize,
        #[source]
        source: ApiError,
    },
    #[error("chunk {index} belongs to query '{found}', expected '{expected}'")]
    ForeignChunk {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("requested chunk {requested} but received chunk {received}")]
    WrongIndex { requested: usize, received: usize },
    #[error("chunk {index} reports {field} {found}, chunk 0 reported {expected}")]
    Inconsistent {
        index: usize,
        field: &'static str,
        expected: Value,
        found: Value,
    },
    #[error("invalid chunk envelope: {0}")]
    InvalidEnvelope(String),
    #[error("chunk {index} is a {found} but chunk 0 is a {expected}")]
    MixedShapes {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("chunk {index} carries a scalar payload that cannot be merged")]
    Unmergeable { index: usize },
}

/// Anything that can serve chunk `index` of a pinned query.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    async fn fetch_chunk(
        &self,
        index: usize,
        limit: usize,
        chunk_id: Option<&str>,
    ) -> Result<ChunkEnvelope, ApiError>;
}

/// Payload shape of a single chunk
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkShape {
    /// Object with a `logs` array; the remaining keys are page metadata
    LogPage {
        logs: Vec<Value>,
        meta: Map<String, Value>,
    },
    Sequence(Vec<Value>),
    Keyed(Map<String, Value>),
    Opaque(Value),
}

impl ChunkShape {
    pub fn classify(data: Value) -> Self {
        match data {
            Value::Object(mut map) => match map.remove("logs") {
                Some(Value::Array(logs)) => ChunkShape::LogPage { logs, meta: map },
                Some(other) => {
                    map.insert("logs".to_string(), other);
                    ChunkShape::Keyed(map)
                }
                None => ChunkShape::Keyed(map),
            },
            Value::Array(items) => ChunkShape::Sequence(items),
            other => ChunkShape::Opaque(other),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChunkShape::LogPage { .. } => "log page",
            ChunkShape::Sequence(_) => "sequence",
            ChunkShape::Keyed(_) => "keyed map",
            ChunkShape::Opaque(_) => "scalar",
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            ChunkShape::LogPage { logs, mut meta } => {
                meta.insert("logs".to_string(), Value::Array(logs));
                Value::Object(meta)
            }
            ChunkShape::Sequence(items) => Value::Array(items),
            ChunkShape::Keyed(map) => Value::Object(map),
            ChunkShape::Opaque(value) => value,
        }
    }
}

/// Which chunk wins when keyed chunks share a key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MergePolicy {
    #[default]
    LastWins,
    FirstWins,
}

#[derive(Debug, Clone)]
pub struct Reassembler {
    limit: usize,
    policy: MergePolicy,
}

impl Reassembler {
    pub fn new(limit: usize, policy: MergePolicy) -> Self {
        Self {
            limit: limit.max(1),
            policy,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Fetch the remaining chunks of `first`'s query and merge them.
    ///
    /// Any failed or mismatched chunk aborts the whole reassembly.
    pub async fn reassemble<S>(
        &self,
        source: &S,
        first: ChunkEnvelope,
    ) -> Result<Value, ReassemblyError>
    where
        S: ChunkSource + ?Sized,
    {
        if !first.chunked {
            return Ok(first.data);
        }
        let chunk_id = first
            .chunk_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ReassemblyError::InvalidEnvelope("chunked envelope without a chunkId".to_string())
            })?;
        let total = first.total_chunks;
        if first.current_chunk >= total {
            return Err(ReassemblyError::InvalidEnvelope(format!(
                "chunk {} out of range (total {})",
                first.current_chunk, total
            )));
        }

        let first_index = first.current_chunk;
        let markers: Vec<(&'static str, Value)> = SNAPSHOT_FIELDS
            .iter()
            .filter_map(|field| snapshot_field(&first.data, field).map(|v| (*field, v.clone())))
            .collect();
        let fetches = (0..total).filter(|i| *i != first_index).map(|index| {
            let chunk_id = chunk_id.as_str();
            async move {
                let result = source.fetch_chunk(index, self.limit, Some(chunk_id)).await;
                (index, result)
            }
        });
        let results = join_all(fetches).await;

        let mut chunks: Vec<(usize, Value)> = Vec::with_capacity(total);
        chunks.push((first_index, first.data));
        for (index, result) in results {
            let envelope = result.map_err(|source| ReassemblyError::Fetch { index, source })?;
            let found = envelope.chunk_id.unwrap_or_default();
            if found != chunk_id {
                return Err(ReassemblyError::ForeignChunk {
                    index,
                    expected: chunk_id,
                    found,
                });
            }
            if envelope.current_chunk != index {
                return Err(ReassemblyError::WrongIndex {
                    requested: index,
                    received: envelope.current_chunk,
                });
            }
            if envelope.total_chunks != total {
                return Err(ReassemblyError::Inconsistent {
                    index,
                    field: "totalChunks",
                    expected: Value::from(total),
                    found: Value::from(envelope.total_chunks),
                });
            }
            if is_log_page(&envelope.data) {
                for (field, expected) in &markers {
                    let found = envelope.data.get(*field).cloned().unwrap_or(Value::Null);
                    if found != *expected {
                        return Err(ReassemblyError::Inconsistent {
                            index,
                            field: *field,
                            expected: expected.clone(),
                            found,
                        });
                    }
                }
            }
            chunks.push((index, envelope.data));
        }
        chunks.sort_by_key(|(index, _)| *index);

        let shapes = chunks
            .into_iter()
            .map(|(index, data)| (index, ChunkShape::classify(data)))
            .collect();
        self.merge(shapes)
    }

    /// Merge classified chunks, in index order. Chunk 0 decides the shape.
    pub fn merge(&self, shapes: Vec<(usize, ChunkShape)>) -> Result<Value, ReassemblyError> {
        let mut shapes = shapes.into_iter();
        let Some((first_index, merged)) = shapes.next() else {
            return Ok(Value::Null);
        };
        let expected = merged.kind();

        let merged = shapes.try_fold(merged, |acc, (index, shape)| {
            match (acc, shape) {
                (
                    ChunkShape::LogPage { mut logs, meta },
                    ChunkShape::LogPage { logs: more, .. },
                ) => {
                    logs.extend(more);
                    Ok(ChunkShape::LogPage { logs, meta })
                }
                (ChunkShape::Sequence(mut items), ChunkShape::Sequence(more)) => {
                    items.extend(more);
                    Ok(ChunkShape::Sequence(items))
                }
                (ChunkShape::Keyed(mut map), ChunkShape::Keyed(more)) => {
                    for (key, value) in more {
                        match self.policy {
                            MergePolicy::LastWins => {
                                map.insert(key, value);
                            }
                            MergePolicy::FirstWins => {
                                map.entry(key).or_insert(value);
                            }
                        }
                    }
                    Ok(ChunkShape::Keyed(map))
                }
                (ChunkShape::Opaque(_), _) => Err(ReassemblyError::Unmergeable { index: first_index }),
                (_, ChunkShape::Opaque(_)) => Err(ReassemblyError::Unmergeable { index }),
                (_, other) => Err(ReassemblyError::MixedShapes {
                    index,
                    expected,
                    found: other.kind(),
                }),
            }
        })?;
        Ok(merged.into_value())
    }
}
