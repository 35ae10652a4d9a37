//! HTTP client for the Tapwire gateway log API

use crate::chunk::{ChunkEnvelope, ChunkSource};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when communicating with the gateway
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API returned error: {message} (status: {status})")]
    Server { status: u16, message: String },
    #[error("Failed to parse response: {0}")]
    Parse(String),
    #[error("Connection failed: {0}")]
    Connection(String),
}

/// Lifetime traffic counters reported by `/stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub incoming: u64,
    #[serde(default)]
    pub outgoing: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "outgoing")]
    Outbound,
    #[serde(rename = "incoming")]
    Inbound,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Traffic record as served by the gateway.
///
/// Every field is optional on the wire; missing values fall back to
/// defaults rather than failing the whole poll.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default, deserialize_with = "lenient_size")]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_encoding: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub body_truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub body_omitted: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub headers_omitted: bool,
}

impl LogRecord {
    /// `timestamp-method-first ten characters of the url`
    pub fn id(&self) -> String {
        let prefix: String = self.url.chars().take(10).collect();
        format!("{}-{}-{}", self.timestamp, self.method, prefix)
    }
}

/// `size` arrives as a decimal string or a number; anything else is 0.
fn lenient_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Body of `GET /reset`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    #[serde(default)]
    pub message: String,
    pub stats: Stats,
}

/// Error response from the gateway
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// The gateway operations the monitor depends on.
#[async_trait]
pub trait LogSource: ChunkSource {
    async fn fetch_logs(&self) -> Result<Vec<LogRecord>, ApiError>;
    async fn fetch_stats(&self) -> Result<Stats, ApiError>;
    async fn reset(&self) -> Result<ResetResponse, ApiError>;
}

/// HTTP client for the gateway
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the gateway is healthy
    pub async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/health", self.base_url);
        let resp = self.send(self.client.get(&url)).await?;
        Ok(resp.status().is_success())
    }

    /// `GET /logs?limit=..&bodies=true&chunk=..&chunkId=..`
    pub async fn get_chunk(
        &self,
        index: usize,
        limit: usize,
        chunk_id: Option<&str>,
    ) -> Result<ChunkEnvelope, ApiError> {
        let url = format!("{}/logs", self.base_url);
        let query = [
            ("limit", limit.to_string()),
            ("bodies", "true".to_string()),
            ("chunk", index.to_string()),
            ("chunkId", chunk_id.unwrap_or_default().to_string()),
        ];
        self.get_json(self.client.get(&url).query(&query)).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let resp = self.send(request).await?;
        if !resp.status().is_success() {
            return self.handle_error(resp).await;
        }
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Parse(e.to_string()))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        request.send().await.map_err(|e| {
            if e.is_connect() {
                ApiError::Connection(format!("Cannot connect to {}", self.base_url))
            } else {
                ApiError::Request(e)
            }
        })
    }

    /// Handle error responses
    async fn handle_error<T>(&self, resp: reqwest::Response) -> Result<T, ApiError> {
        let status = resp.status();
        if let Ok(body) = resp.json::<ErrorResponse>().await {
            return Err(ApiError::Server {
                status: status.as_u16(),
                message: body.error,
            });
        }
        Err(ApiError::Server {
            status: status.as_u16(),
            message: format!("Request failed with status {}", status),
        })
    }
}

#[async_trait]
impl ChunkSource for ApiClient {
    async fn fetch_chunk(
        &self,
        index: usize,
        limit: usize,
        chunk_id: Option<&str>,
    ) -> Result<ChunkEnvelope, ApiError> {
        self.get_chunk(index, limit, chunk_id).await
    }
}

#[async_trait]
impl LogSource for ApiClient {
    async fn fetch_logs(&self) -> Result<Vec<LogRecord>, ApiError> {
        let url = format!("{}/logs", self.base_url);
        self.get_json(self.client.get(&url)).await
    }

    async fn fetch_stats(&self) -> Result<Stats, ApiError> {
        let url = format!("{}/stats", self.base_url);
        self.get_json(self.client.get(&url)).await
    }

    async fn reset(&self) -> Result<ResetResponse, ApiError> {
        let url = format!("{}/reset", self.base_url);
        self.get_json(self.client.get(&url)).await
    }
}
