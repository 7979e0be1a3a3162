//! Wire records exchanged with the ARI proxy
//!
//! All payloads are JSON. Missing fields are decode errors; nothing is ever
//! filled in with zero values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AriError, AriResult};

/// Request sent to the PBX through the commands topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Correlation id; generated on submit when empty
    pub unique_id: String,
    /// ARI resource path, e.g. `/channels/1234/play`
    pub url: String,
    /// HTTP method
    pub method: String,
    /// JSON body, possibly empty
    pub body: String,
}

impl Command {
    /// Create a command without an id
    pub fn new(url: impl Into<String>, method: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            unique_id: String::new(),
            url: url.into(),
            method: method.into(),
            body: body.into(),
        }
    }

    /// Use a caller-chosen correlation id
    pub fn with_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = unique_id.into();
        self
    }

    pub fn encode(&self) -> AriResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AriError::encode("command", e))
    }

    pub fn decode(payload: &[u8]) -> AriResult<Self> {
        serde_json::from_slice(payload).map_err(|e| AriError::decode("command", e))
    }
}

/// Reply to a [`Command`], matched by `unique_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub unique_id: String,
    pub status_code: u16,
    pub response_body: String,
}

impl CommandResponse {
    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn encode(&self) -> AriResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AriError::encode("command response", e))
    }

    pub fn decode(payload: &[u8]) -> AriResult<Self> {
        serde_json::from_slice(payload).map_err(|e| AriError::decode("command response", e))
    }
}

/// ARI event as published by the proxy on a dialog's events topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Asterisk server that raised the event
    pub server_id: String,
    pub timestamp: DateTime<Utc>,
    /// ARI event type, e.g. `StasisStart`
    #[serde(rename = "type")]
    pub event_type: String,
    /// Original ARI JSON document, kept opaque
    pub ari_body: String,
}

impl Event {
    pub fn decode(payload: &[u8]) -> AriResult<Self> {
        serde_json::from_slice(payload).map_err(|e| AriError::decode("event", e))
    }

    pub fn encode(&self) -> AriResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AriError::encode("event", e))
    }

    /// Parse the opaque ARI body
    pub fn body_json(&self) -> AriResult<serde_json::Value> {
        serde_json::from_str(&self.ari_body).map_err(|e| AriError::decode("ARI event body", e))
    }
}

/// Signal announcing a new dialog for an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStart {
    pub application: String,
    pub dialog_id: String,
}

impl AppStart {
    pub fn new(application: impl Into<String>, dialog_id: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            dialog_id: dialog_id.into(),
        }
    }

    pub fn encode(&self) -> AriResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AriError::encode("start signal", e))
    }

    pub fn decode(payload: &[u8]) -> AriResult<Self> {
        serde_json::from_slice(payload).map_err(|e| AriError::decode("start signal", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_command_round_trip() {
        let command = Command::new("/channels/42/answer", "POST", "{}").with_id("id-1");
        let decoded = Command::decode(&command.encode().unwrap()).unwrap();
        assert_eq!(decoded, command);
    }

    #[test]
    fn test_command_wire_field_names() {
        let command = Command::new("/bridges", "GET", "").with_id("x");
        let value: serde_json::Value = serde_json::from_slice(&command.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"unique_id": "x", "url": "/bridges", "method": "GET", "body": ""})
        );
    }

    #[test]
    fn test_event_decodes_from_proxy_payload() {
        let payload = br#"{"server_id":"s1","timestamp":"2023-01-01T00:00:00Z","type":"StasisStart","ari_body":"{}"}"#;
        let event = Event::decode(payload).unwrap();

        assert_eq!(event.server_id, "s1");
        assert_eq!(event.event_type, "StasisStart");
        assert_eq!(event.timestamp, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(event.body_json().unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_incomplete_event_is_a_decode_error() {
        let err = Event::decode(br#"{"server_id":"s1","type":"StasisStart"}"#).unwrap_err();
        match err {
            AriError::Decode { what, .. } => assert_eq!(what, "event"),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(Event::decode(b"not json").is_err());
    }

    #[test]
    fn test_response_status() {
        let response = CommandResponse::decode(br#"{"unique_id":"a","status_code":204,"response_body":""}"#).unwrap();
        assert!(response.is_success());

        let response = CommandResponse {
            unique_id: "b".to_string(),
            status_code: 404,
            response_body: "{\"message\":\"Channel not found\"}".to_string(),
        };
        assert!(!response.is_success());
    }

    #[test]
    fn test_start_signal_decode() {
        let start = AppStart::decode(br#"{"application":"ivr","dialog_id":"d-1"}"#).unwrap();
        assert_eq!(start, AppStart::new("ivr", "d-1"));
    }
}
