// src/recorder/mod.rs

pub mod keyframe;
pub mod segment_writer;

pub use keyframe::is_h264_keyframe;
pub use segment_writer::SegmentRecorder;

/// Static description of one camera, copied into every segment sidecar.
#[derive(Debug, Clone)]
pub struct CameraProfile {
    pub name: String,
    pub camera_type: Option<String>,
    pub device_id: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: u32,
    pub bitrate: u64,
}

impl CameraProfile {
    pub fn new(name: &str, fps: u32) -> Self {
        Self {
            name: name.to_string(),
            camera_type: None,
            device_id: None,
            width: None,
            height: None,
            fps,
            bitrate: 8_000_000,
        }
    }
}
