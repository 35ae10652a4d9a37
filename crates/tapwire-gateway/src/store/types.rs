//! Types for intercepted traffic - records, directions and lifetime counters.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Method sentinel used by inbound records.
pub const RESPONSE_METHOD: &str = "RESPONSE";

/// Direction of an intercepted event, as seen from the client application.
///
/// Serialized as `outgoing`/`incoming` to keep the wire format consumers
/// already understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Request forwarded to the upstream host
    #[serde(rename = "outgoing")]
    Outbound,
    /// Response received from the upstream host
    #[serde(rename = "incoming")]
    Inbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outbound => "outgoing",
            Direction::Inbound => "incoming",
        }
    }
}

/// Encoding of a captured body that is not valid UTF-8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Base64,
}

/// One intercepted event. Immutable once appended to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficRecord {
    /// Capture time in milliseconds since the unix epoch
    pub timestamp: i64,
    pub direction: Direction,
    pub method: String,
    /// Path and query as requested by the client
    pub url: String,
    /// HTTP status, 0 for outbound records
    pub status: u16,
    #[serde(with = "size_as_string")]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_encoding: Option<BodyEncoding>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub body_truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl TrafficRecord {
    /// Outbound record for a request about to be forwarded.
    pub fn outbound(method: &str, url: &str, size: u64) -> Self {
        Self {
            timestamp: now_millis(),
            direction: Direction::Outbound,
            method: method.to_uppercase(),
            url: url.to_string(),
            status: 0,
            size,
            body: None,
            body_encoding: None,
            body_truncated: false,
            headers: None,
        }
    }

    /// Inbound record for a finalized response.
    pub fn inbound(url: &str, status: u16, size: u64) -> Self {
        Self {
            timestamp: now_millis(),
            direction: Direction::Inbound,
            method: RESPONSE_METHOD.to_string(),
            url: url.to_string(),
            status,
            size,
            body: None,
            body_encoding: None,
            body_truncated: false,
            headers: None,
        }
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Attach a captured copy of the body, keeping at most `cap` bytes.
    ///
    /// Bodies that are not valid UTF-8 are stored base64-encoded.
    pub fn with_body_bytes(mut self, bytes: &[u8], cap: usize) -> Self {
        if bytes.is_empty() {
            return self;
        }
        let kept = &bytes[..bytes.len().min(cap)];
        self.body_truncated = kept.len() < bytes.len();
        match std::str::from_utf8(kept) {
            Ok(text) => self.body = Some(text.to_string()),
            Err(e) if self.body_truncated && e.error_len().is_none() => {
                // Cut inside a multi-byte sequence; keep the valid prefix.
                let valid = &kept[..e.valid_up_to()];
                self.body = Some(String::from_utf8_lossy(valid).into_owned());
            }
            Err(_) => {
                self.body = Some(base64::engine::general_purpose::STANDARD.encode(kept));
                self.body_encoding = Some(BodyEncoding::Base64);
            }
        }
        self
    }

    /// Copy of this record without body and headers.
    pub fn summary(&self) -> Self {
        Self {
            body: None,
            body_encoding: None,
            body_truncated: false,
            headers: None,
            ..self.clone()
        }
    }
}

/// Lifetime counters of recorded traffic.
///
/// Never decremented by eviction; only Reset Control zeroes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub incoming: u64,
    pub outgoing: u64,
}

impl Stats {
    pub fn count(&mut self, direction: Direction) {
        match direction {
            Direction::Inbound => self.incoming += 1,
            Direction::Outbound => self.outgoing += 1,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.incoming == 0 && self.outgoing == 0
    }
}

/// Current time in milliseconds since the unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `size` travels as a decimal string but is accepted as a number too.
mod size_as_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(size: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&size.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) if s.trim().is_empty() => Ok(0),
            Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_wire_names() {
        assert_eq!(
            serde_json::to_string(&Direction::Outbound).unwrap(),
            "\"outgoing\""
        );
        assert_eq!(
            serde_json::to_string(&Direction::Inbound).unwrap(),
            "\"incoming\""
        );
    }

    #[test]
    fn test_record_serializes_camel_case_and_string_size() {
        let record = TrafficRecord::outbound("post", "/api/v1/chat?x=1", 42).at(1_000);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["method"], "POST");
        assert_eq!(json["size"], "42");
        assert_eq!(json["status"], 0);
        assert_eq!(json["direction"], "outgoing");
        assert!(json.get("body").is_none());
        assert!(json.get("bodyTruncated").is_none());
    }

    #[test]
    fn test_size_accepts_number_or_string() {
        let from_str: TrafficRecord = serde_json::from_str(
            r#"{"timestamp":1,"direction":"incoming","method":"RESPONSE","url":"/a","status":200,"size":"12"}"#,
        )
        .unwrap();
        let from_num: TrafficRecord = serde_json::from_str(
            r#"{"timestamp":1,"direction":"incoming","method":"RESPONSE","url":"/a","status":200,"size":12}"#,
        )
        .unwrap();
        assert_eq!(from_str.size, 12);
        assert_eq!(from_num.size, 12);
    }

    #[test]
    fn test_body_capture_truncates() {
        let record = TrafficRecord::inbound("/a", 200, 10).with_body_bytes(b"0123456789", 4);
        assert_eq!(record.body.as_deref(), Some("0123"));
        assert!(record.body_truncated);
        assert!(record.body_encoding.is_none());
    }

    #[test]
    fn test_body_capture_binary_is_base64() {
        let record = TrafficRecord::inbound("/a", 200, 3).with_body_bytes(&[0xff, 0xfe, 0x00], 64);
        assert_eq!(record.body_encoding, Some(BodyEncoding::Base64));
        assert_eq!(record.body.as_deref(), Some("//4A"));
    }

    #[test]
    fn test_body_capture_cut_inside_utf8_sequence() {
        let text = "héllo".as_bytes();
        // 'é' spans bytes 1..3; cut after its first byte
        let record = TrafficRecord::outbound("POST", "/a", 6).with_body_bytes(text, 2);
        assert_eq!(record.body.as_deref(), Some("h"));
        assert!(record.body_truncated);
    }

    #[test]
    fn test_stats_count() {
        let mut stats = Stats::default();
        assert!(stats.is_zero());
        stats.count(Direction::Outbound);
        stats.count(Direction::Inbound);
        stats.count(Direction::Inbound);
        assert_eq!(
            stats,
            Stats {
                incoming: 2,
                outgoing: 1
            }
        );
    }
}
