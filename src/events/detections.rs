// src/events/detections.rs

use std::fs;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::DetectionError;
use crate::extract::ClipOutcome;

use super::event::Event;

/// One frame's worth of detections as returned by the inference service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DetectionFrame {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default = "no_frame")]
    pub frame_number: i64,
    #[serde(default)]
    pub objects: Vec<Value>,
}

fn no_frame() -> i64 {
    -1
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    detections: Vec<DetectionFrame>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the inference service's `get_detections` query.
pub struct DetectionClient {
    addr: String,
    timeout: Duration,
}

impl DetectionClient {
    pub fn new(addr: &str, timeout: Duration) -> Self {
        Self {
            addr: addr.to_string(),
            timeout,
        }
    }

    pub fn query(
        &self,
        camera: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DetectionFrame>, DetectionError> {
        let addr = self.addr.to_socket_addrs()?.next().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unresolvable address")
        })?;

        let mut stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let request = json!({
            "action": "get_detections",
            "camera": camera,
            "start_time": start.to_rfc3339(),
            "end_time": end.to_rfc3339(),
        });
        stream.write_all(&serde_json::to_vec(&request)?)?;
        stream.flush()?;

        let response = read_json_document(&mut stream)?;
        if response.status == "success" {
            log::debug!("[detections] {} frame(s) for {}", response.detections.len(), camera);
            Ok(response.detections)
        } else {
            Err(DetectionError::Remote(
                response.message.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

/// The service does not frame its reply; read until the bytes form one
/// complete JSON document or the peer closes.
fn read_json_document<R: Read>(r: &mut R) -> Result<QueryResponse, DetectionError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = r.read(&mut chunk)?;
        if n == 0 {
            return Ok(serde_json::from_slice(&buf)?);
        }
        buf.extend_from_slice(&chunk[..n]);
        match serde_json::from_slice(&buf) {
            Ok(resp) => return Ok(resp),
            Err(e) if e.is_eof() => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NoteDetection {
    pub timestamp: String,
    pub frame_number: i64,
    pub class_id: Value,
    pub confidence: f64,
    pub bbox: Vec<f64>,
    pub bbox_color: String,
    pub has_bbox: bool,
}

impl NoteDetection {
    fn from_object(timestamp: &str, frame_number: i64, obj: &Value) -> Self {
        let bbox = obj
            .get("bbox")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_else(|| vec![0.0; 4]);

        Self {
            timestamp: timestamp.to_string(),
            frame_number,
            class_id: obj.get("class_id").cloned().unwrap_or(Value::String(String::new())),
            confidence: obj.get("confidence").and_then(Value::as_f64).unwrap_or(0.0),
            bbox,
            bbox_color: obj
                .get("bbox_color")
                .and_then(Value::as_str)
                .unwrap_or("green")
                .to_string(),
            has_bbox: obj.get("has_bbox").and_then(Value::as_bool).unwrap_or(true),
        }
    }
}

/// Companion `<clip>.detections.json` written next to every clip.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClipNotes {
    pub event_time: DateTime<Utc>,
    pub event_type: String,
    pub event_class: i64,
    pub camera: String,
    pub clip_start: Option<DateTime<Utc>>,
    pub clip_end: Option<DateTime<Utc>>,
    pub frame_count: usize,
    pub total_detections: usize,
    pub detections: Vec<NoteDetection>,
}

impl ClipNotes {
    /// Flattens queried detections; falls back to the objects the event
    /// carried itself when the query returned nothing.
    pub fn build(event: &Event, outcome: &ClipOutcome, frames: &[DetectionFrame]) -> Self {
        let mut detections: Vec<NoteDetection> = frames
            .iter()
            .flat_map(|f| {
                f.objects
                    .iter()
                    .map(move |o| NoteDetection::from_object(&f.timestamp, f.frame_number, o))
            })
            .collect();

        if detections.is_empty() {
            let ts = event.timestamp.to_rfc3339();
            detections = event
                .attached_objects()
                .iter()
                .map(|o| NoteDetection::from_object(&ts, -1, o))
                .collect();
        }

        Self {
            event_time: event.timestamp,
            event_type: event.kind.clone(),
            event_class: event.event_class.unwrap_or(0),
            camera: event.camera.clone(),
            clip_start: outcome.actual_start(),
            clip_end: outcome.actual_end(),
            frame_count: outcome.frame_count(),
            total_detections: detections.len(),
            detections,
        }
    }

    pub fn path_for(clip: &Path) -> PathBuf {
        clip.with_extension("detections.json")
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw).with_context(|| format!("write {}", path.display()))
    }
}
