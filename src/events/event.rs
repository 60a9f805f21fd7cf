// src/events/event.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::IngestError;
use crate::core::timestamp::parse_iso8601;

/// An externally triggered event, as admitted by the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub camera: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_class: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: Option<String>,
    camera: Option<String>,
    timestamp: Option<String>,
    camera_type: Option<Value>,
    event_class: Option<i64>,
    metadata: Option<Value>,
}

impl Event {
    pub fn new(kind: &str, camera: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: kind.to_string(),
            camera: camera.to_string(),
            timestamp,
            camera_type: None,
            event_class: None,
            metadata: None,
        }
    }

    /// Parses one ingestion payload (UTF-8 JSON).
    pub fn from_json(payload: &[u8]) -> Result<Self, IngestError> {
        let text = String::from_utf8(payload.to_vec())?;
        let wire: WireEvent = serde_json::from_str(&text)?;

        let kind = non_empty(wire.kind).ok_or(IngestError::MissingField("type"))?;
        let camera = non_empty(wire.camera).ok_or(IngestError::MissingField("camera"))?;
        let raw_ts = non_empty(wire.timestamp).ok_or(IngestError::MissingField("timestamp"))?;
        let timestamp = parse_iso8601(&raw_ts).ok_or(IngestError::BadTimestamp(raw_ts))?;

        // camera_type kommt je nach Sender als Zahl oder String
        let camera_type = match wire.camera_type {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Ok(Self {
            kind,
            camera,
            timestamp,
            camera_type,
            event_class: wire.event_class,
            metadata: wire.metadata,
        })
    }

    /// Objects attached by the sender under `metadata.objects`, if any.
    pub fn attached_objects(&self) -> &[Value] {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("objects"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
