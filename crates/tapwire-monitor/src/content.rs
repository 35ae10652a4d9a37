//! Presentation of captured traffic: body formatting, request kinds and
//! status classes.

use crate::api::{Direction, LogRecord};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Marker shown when the gateway left a body out of its response
pub const OMITTED_BODY_MESSAGE: &str = "Body too large, omitted by the gateway";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FormattedBody {
    Omitted(String),
    Empty,
    Json(Value),
    Text(String),
    /// Base64 as captured by the gateway
    Binary(String),
}

impl FormattedBody {
    pub fn from_record(record: &LogRecord) -> Self {
        if record.body_omitted {
            return FormattedBody::Omitted(OMITTED_BODY_MESSAGE.to_string());
        }
        match &record.body {
            None | Some(Value::Null) => FormattedBody::Empty,
            Some(Value::String(s)) if record.body_encoding.as_deref() == Some("base64") => {
                if s.is_empty() {
                    FormattedBody::Empty
                } else {
                    FormattedBody::Binary(s.clone())
                }
            }
            Some(Value::String(s)) => format_text(s),
            Some(other) => FormattedBody::Json(other.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FormattedBody::Empty)
    }
}

/// Parse strings that look like a JSON object or array; anything that
/// fails to parse is kept as text.
pub fn format_text(body: &str) -> FormattedBody {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return FormattedBody::Empty;
    }
    let looks_like_json = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if looks_like_json {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return FormattedBody::Json(value);
        }
    }
    FormattedBody::Text(body.to_string())
}

/// What an intercepted call is for, judged by its URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Completion,
    Chat,
    UserProfile,
    Settings,
    Models,
    Workspace,
    Analysis,
    Response,
    Other,
}

impl RequestKind {
    pub fn classify(method: &str, url: &str) -> Self {
        const BY_PATH: [(&str, RequestKind); 7] = [
            ("/completions", RequestKind::Completion),
            ("/chat", RequestKind::Chat),
            ("/user", RequestKind::UserProfile),
            ("/settings", RequestKind::Settings),
            ("/models", RequestKind::Models),
            ("/workspace", RequestKind::Workspace),
            ("/analysis", RequestKind::Analysis),
        ];
        BY_PATH
            .iter()
            .find(|(fragment, _)| url.contains(fragment))
            .map(|(_, kind)| *kind)
            .unwrap_or(if method == "RESPONSE" {
                RequestKind::Response
            } else {
                RequestKind::Other
            })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::Completion => "completion",
            RequestKind::Chat => "chat",
            RequestKind::UserProfile => "user profile",
            RequestKind::Settings => "settings",
            RequestKind::Models => "models",
            RequestKind::Workspace => "workspace",
            RequestKind::Analysis => "code analysis",
            RequestKind::Response => "response",
            RequestKind::Other => "other",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// No status yet (outbound records)
    Pending,
    Success,
    Redirect,
    ClientError,
    ServerError,
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirect,
            400..=499 => StatusClass::ClientError,
            500..=u16::MAX => StatusClass::ServerError,
            _ => StatusClass::Pending,
        }
    }
}

/// Display-ready view of one captured request or response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: String,
    pub timestamp: i64,
    pub direction: Direction,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub status_class: StatusClass,
    pub kind: RequestKind,
    pub size: u64,
    pub headers: BTreeMap<String, Value>,
    pub body: FormattedBody,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub body_truncated: bool,
}

impl From<&LogRecord> for Content {
    fn from(record: &LogRecord) -> Self {
        let headers = if record.headers_omitted {
            BTreeMap::new()
        } else {
            record.headers.clone().unwrap_or_default()
        };
        Self {
            id: record.id(),
            timestamp: record.timestamp,
            direction: record.direction,
            method: record.method.clone(),
            url: record.url.clone(),
            status: record.status,
            status_class: StatusClass::of(record.status),
            kind: RequestKind::classify(&record.method, &record.url),
            size: record.size,
            headers,
            body: FormattedBody::from_record(record),
            body_truncated: record.body_truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(body: Option<Value>) -> LogRecord {
        LogRecord {
            timestamp: 1,
            direction: Direction::Inbound,
            method: "RESPONSE".to_string(),
            url: "/api/v1/chat".to_string(),
            status: 200,
            body,
            ..LogRecord::default()
        }
    }

    #[test]
    fn test_json_string_is_parsed() {
        let body = FormattedBody::from_record(&record(Some(json!("{\"a\": [1, 2]}"))));
        assert_eq!(body, FormattedBody::Json(json!({"a": [1, 2]})));

        let body = format_text("  [1, 2, 3]\n");
        assert_eq!(body, FormattedBody::Json(json!([1, 2, 3])));
    }

    #[test]
    fn test_malformed_json_falls_back_to_text() {
        let body = format_text("{not json}");
        assert_eq!(body, FormattedBody::Text("{not json}".to_string()));
    }

    #[test]
    fn test_plain_text_and_blank() {
        assert_eq!(
            format_text("hello"),
            FormattedBody::Text("hello".to_string())
        );
        assert_eq!(format_text("   \n"), FormattedBody::Empty);
        assert!(FormattedBody::from_record(&record(None)).is_empty());
        assert!(FormattedBody::from_record(&record(Some(Value::Null))).is_empty());
    }

    #[test]
    fn test_structured_body_passes_through() {
        let body = FormattedBody::from_record(&record(Some(json!({"ok": true}))));
        assert_eq!(body, FormattedBody::Json(json!({"ok": true})));
    }

    #[test]
    fn test_omitted_and_binary() {
        let mut omitted = record(Some(json!("ignored")));
        omitted.body_omitted = true;
        assert!(matches!(
            FormattedBody::from_record(&omitted),
            FormattedBody::Omitted(_)
        ));

        let mut binary = record(Some(json!("AAEC")));
        binary.body_encoding = Some("base64".to_string());
        assert_eq!(
            FormattedBody::from_record(&binary),
            FormattedBody::Binary("AAEC".to_string())
        );
    }

    #[test]
    fn test_request_kind() {
        assert_eq!(
            RequestKind::classify("POST", "/api/v1/completions"),
            RequestKind::Completion
        );
        assert_eq!(RequestKind::classify("POST", "/api/v1/chat"), RequestKind::Chat);
        assert_eq!(
            RequestKind::classify("GET", "/api/v1/user/profile"),
            RequestKind::UserProfile
        );
        assert_eq!(RequestKind::classify("RESPONSE", "/api/x"), RequestKind::Response);
        assert_eq!(RequestKind::classify("GET", "/api/x"), RequestKind::Other);
    }

    #[test]
    fn test_status_class() {
        assert_eq!(StatusClass::of(0), StatusClass::Pending);
        assert_eq!(StatusClass::of(204), StatusClass::Success);
        assert_eq!(StatusClass::of(302), StatusClass::Redirect);
        assert_eq!(StatusClass::of(404), StatusClass::ClientError);
        assert_eq!(StatusClass::of(502), StatusClass::ServerError);
    }

    #[test]
    fn test_content_drops_omitted_headers() {
        let mut rec = record(Some(json!("x")));
        rec.headers = Some(BTreeMap::from([("a".to_string(), json!("b"))]));
        assert_eq!(Content::from(&rec).headers.len(), 1);
        rec.headers_omitted = true;
        assert!(Content::from(&rec).headers.is_empty());
        assert_eq!(Content::from(&rec).kind, RequestKind::Chat);
    }
}
