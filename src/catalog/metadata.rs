// src/catalog/metadata.rs

use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JSON-Sidecar, einmal beim Anlegen eines Segments geschrieben.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SegmentMetadata {
    pub camera_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    pub start_time: DateTime<Utc>,
    pub video_file: String,
    pub index_file: String,
}

impl SegmentMetadata {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw).with_context(|| format!("write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_sidecar_parses() {
        let raw = r#"{
            "camera_name": "RGB_Camera",
            "start_time": "2025-03-01T12:00:00Z",
            "video_file": "RGB_Camera_20250301_120000.h264",
            "index_file": "RGB_Camera_20250301_120000.idx"
        }"#;
        let meta: SegmentMetadata = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.camera_name, "RGB_Camera");
        assert!(meta.fps.is_none());
    }

    #[test]
    fn full_sidecar_parses() {
        let raw = r#"{
            "camera_name": "Thermal_Camera",
            "camera_type": "thermal",
            "device_id": "/dev/video1",
            "width": 640,
            "height": 512,
            "fps": 10,
            "bitrate": 8000000,
            "start_time": "2025-03-01T12:05:00.250+00:00",
            "video_file": "a.h264",
            "index_file": "a.idx"
        }"#;
        let meta: SegmentMetadata = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.fps, Some(10));
        assert_eq!(meta.start_time.timestamp_subsec_millis(), 250);
    }
}
