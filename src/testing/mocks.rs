use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};

use crate::core::MuxError;
use crate::extract::Muxer;
use crate::index::FrameIndexEntry;
use crate::recorder::{CameraProfile, SegmentRecorder};

#[derive(Debug, Clone, PartialEq)]
pub enum MuxCall {
    Bytes {
        data: Vec<u8>,
        fps: u32,
        output: PathBuf,
    },
    Concat {
        /// Fragment contents as seen at call time; the files are gone afterwards.
        fragments: Vec<Vec<u8>>,
        paths: Vec<PathBuf>,
        fps: u32,
        output: PathBuf,
    },
}

impl MuxCall {
    /// All bytes that went into the clip, in order.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            MuxCall::Bytes { data, .. } => data.clone(),
            MuxCall::Concat { fragments, .. } => fragments.concat(),
        }
    }
}

/// Muxer double: records every call and writes the joined input as "clip".
#[derive(Clone, Default)]
pub struct RecordingMuxer {
    calls: Arc<Mutex<Vec<MuxCall>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<MuxCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: MuxCall) -> Result<(), MuxError> {
        let failing = self.fail.load(Ordering::SeqCst);
        let (output, payload) = match &call {
            MuxCall::Bytes { output, .. } | MuxCall::Concat { output, .. } => {
                (output.clone(), call.payload())
            }
        };

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }

        if failing {
            return Err(MuxError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "mock muxer told to fail".to_string(),
            });
        }

        fs::write(&output, payload)
            .map_err(|e| MuxError::io(format!("write {}", output.display()), e))
    }
}

impl Muxer for RecordingMuxer {
    fn mux_bytes(&self, data: &[u8], fps: u32, output: &Path) -> Result<(), MuxError> {
        self.record(MuxCall::Bytes {
            data: data.to_vec(),
            fps,
            output: output.to_path_buf(),
        })
    }

    fn concat(&self, fragments: &[PathBuf], fps: u32, output: &Path) -> Result<(), MuxError> {
        let mut contents = Vec::with_capacity(fragments.len());
        for p in fragments {
            let bytes =
                fs::read(p).map_err(|e| MuxError::io(format!("read {}", p.display()), e))?;
            contents.push(bytes);
        }
        self.record(MuxCall::Concat {
            fragments: contents,
            paths: fragments.to_vec(),
            fps,
            output: output.to_path_buf(),
        })
    }
}

/// Synthetic Annex-B access unit: IDR (NAL 5) or non-IDR slice (NAL 1),
/// tagged with the frame counter so byte ranges can be traced back.
pub fn synthetic_frame(n: u32, keyframe: bool) -> Vec<u8> {
    let nal = if keyframe { 0x65 } else { 0x41 };
    let mut data = vec![0x00, 0x00, 0x00, 0x01, nal];
    data.extend_from_slice(&n.to_be_bytes());
    // variable Länge, damit Offsets nicht trivial gleichmäßig sind
    data.extend(std::iter::repeat_n(0xAB, (n % 7) as usize));
    data
}

/// Drives a [`SegmentRecorder`] with a fake camera clock.
pub struct SyntheticCamera {
    recorder: SegmentRecorder,
    start: DateTime<Utc>,
    fps: u32,
    keyframe_interval: u32,
    next_frame: u32,
}

impl SyntheticCamera {
    pub fn new(
        base_dir: &Path,
        camera: &str,
        start: DateTime<Utc>,
        fps: u32,
        keyframe_interval: u32,
        segment_duration: Duration,
    ) -> Self {
        let profile = CameraProfile::new(camera, fps);
        Self {
            recorder: SegmentRecorder::new(base_dir.to_path_buf(), profile, segment_duration),
            start,
            fps,
            keyframe_interval: keyframe_interval.max(1),
            next_frame: 0,
        }
    }

    /// Capture time of the frame with global counter `n`.
    pub fn frame_time(&self, n: u32) -> DateTime<Utc> {
        self.start + TimeDelta::microseconds(i64::from(n) * 1_000_000 / i64::from(self.fps))
    }

    pub fn record(&mut self, frames: u32) -> Result<Vec<FrameIndexEntry>> {
        let mut written = Vec::with_capacity(frames as usize);
        for _ in 0..frames {
            let n = self.next_frame;
            let data = synthetic_frame(n, n % self.keyframe_interval == 0);
            written.push(self.recorder.write_frame(&data, self.frame_time(n))?);
            self.next_frame += 1;
        }
        Ok(written)
    }

    pub fn record_secs(&mut self, secs: u32) -> Result<Vec<FrameIndexEntry>> {
        self.record(secs * self.fps)
    }

    /// Opens a new segment whose sidecar start is `start`, independent of
    /// when the next frame arrives.
    pub fn roll_at(&mut self, start: DateTime<Utc>) -> Result<PathBuf> {
        self.recorder.roll(start)
    }

    /// Jumps the clock forward without writing (a recording gap).
    pub fn skip(&mut self, frames: u32) {
        self.next_frame += frames;
    }

    pub fn close(&mut self) {
        self.recorder.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::is_h264_keyframe;

    #[test]
    fn synthetic_frames_carry_nal_type() {
        assert!(is_h264_keyframe(&synthetic_frame(0, true)));
        assert!(!is_h264_keyframe(&synthetic_frame(1, false)));
        assert_ne!(synthetic_frame(3, false).len(), synthetic_frame(4, false).len());
    }

    #[test]
    fn failing_muxer_still_records() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = RecordingMuxer::new();
        muxer.set_fail(true);

        let out = dir.path().join("clip.mp4");
        assert!(muxer.mux_bytes(b"abc", 10, &out).is_err());
        assert_eq!(muxer.calls().len(), 1);
        assert!(!out.exists());
    }
}
