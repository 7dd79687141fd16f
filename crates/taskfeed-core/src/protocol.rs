//! Server→client frames on the task progress channel.
//!
//! Every frame is a JSON text message tagged by `type`:
//!
//! ```json
//! {"type":"connected"}
//! {"type":"progress","status":"downloading","progress":42,"progress_message":"...","downloaded_count":420,"estimated_total":1000}
//! {"type":"complete","downloaded_count":1000,"message":"done"}
//! {"type":"error","error":"symbol not found"}
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::FeedError;
use crate::progress::DownloadProgress;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Backend accepted the subscription and is ready to stream.
    Connected,
    Progress(DownloadProgress),
    Complete {
        #[serde(default)]
        downloaded_count: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Any `type` this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Decode one text frame. Malformed JSON is a protocol error.
    pub fn decode(text: &str) -> Result<Self, FeedError> {
        serde_json::from_str(text).map_err(|e| FeedError::Protocol(e.to_string()))
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Progress(_) => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// Human-readable text of an `error` frame: `error` wins over `message`.
pub fn error_text(error: Option<&str>, message: Option<&str>) -> String {
    error
        .or(message)
        .filter(|s| !s.is_empty())
        .unwrap_or("Unknown error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_connected() {
        let msg = ServerMessage::decode(r#"{"type":"connected"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Connected);
    }

    #[test]
    fn decode_progress_full() {
        let msg = ServerMessage::decode(
            r#"{"type":"progress","status":"downloading","progress":42.5,
                "progress_message":"fetching","downloaded_count":425,"estimated_total":1000}"#,
        )
        .unwrap();
        let ServerMessage::Progress(p) = msg else {
            panic!("expected progress, got {msg:?}");
        };
        assert_eq!(p.status, "downloading");
        assert_eq!(p.progress, 42.5);
        assert_eq!(p.progress_message, "fetching");
        assert_eq!(p.downloaded_count, 425);
        assert_eq!(p.estimated_total, Some(1000));
    }

    #[test]
    fn decode_progress_null_total_and_missing_fields() {
        let msg =
            ServerMessage::decode(r#"{"type":"progress","progress":10,"estimated_total":null}"#)
                .unwrap();
        let ServerMessage::Progress(p) = msg else {
            panic!("expected progress");
        };
        assert_eq!(p.progress, 10.0);
        assert_eq!(p.estimated_total, None);
        assert_eq!(p.downloaded_count, 0);
        assert!(p.status.is_empty());
    }

    #[test]
    fn decode_complete() {
        let msg = ServerMessage::decode(r#"{"type":"complete","downloaded_count":7}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Complete {
                downloaded_count: 7,
                message: None
            }
        );
    }

    #[test]
    fn decode_error_prefers_error_field() {
        let msg = ServerMessage::decode(r#"{"type":"error","error":"a","message":"b"}"#).unwrap();
        let ServerMessage::Error { error, message } = msg else {
            panic!("expected error");
        };
        assert_eq!(error_text(error.as_deref(), message.as_deref()), "a");
        assert_eq!(error_text(None, Some("b")), "b");
        assert_eq!(error_text(None, None), "Unknown error");
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let msg = ServerMessage::decode(r#"{"type":"heartbeat","ts":1}"#).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
    }

    #[test]
    fn malformed_json_is_protocol_error() {
        let err = ServerMessage::decode("{not json").unwrap_err();
        assert_eq!(err.error_kind(), "protocol");
        assert!(err.to_string().starts_with("Failed to parse message"));
    }

    #[test]
    fn missing_type_is_protocol_error() {
        let err = ServerMessage::decode(r#"{"progress":1}"#).unwrap_err();
        assert!(matches!(err, FeedError::Protocol(_)));
    }

    #[test]
    fn encode_tags_type() {
        let json = ServerMessage::Complete {
            downloaded_count: 3,
            message: None,
        }
        .encode();
        assert!(json.contains("\"type\":\"complete\""));
        assert!(json.contains("\"downloaded_count\":3"));
    }
}
