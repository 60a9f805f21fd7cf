// src/recorder/segment_writer.rs

use std::fs::{File, OpenOptions, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};

use crate::catalog::{SegmentMetadata, camera_dir};
use crate::core::{ComponentLogger, LogContext};
use crate::index::{FrameIndexEntry, IndexWriter};

use super::CameraProfile;
use super::keyframe::is_h264_keyframe;

struct OpenSegment {
    base_name: String,
    start: DateTime<Utc>,
    video: File,
    index: IndexWriter,
    frame_count: u32,
    byte_offset: u64,
}

/// Rolling writer: raw H.264 stream + index + JSON sidecar per segment.
pub struct SegmentRecorder {
    base_dir: PathBuf,
    profile: CameraProfile,
    segment_duration: TimeDelta,
    current: Option<OpenSegment>,
}

impl SegmentRecorder {
    pub fn new(base_dir: PathBuf, profile: CameraProfile, segment_duration: Duration) -> Self {
        Self {
            base_dir,
            profile,
            segment_duration: TimeDelta::from_std(segment_duration)
                .unwrap_or_else(|_| TimeDelta::seconds(300)),
            current: None,
        }
    }

    /// Appends one encoded access unit captured at `timestamp`.
    ///
    /// Bytes are flushed to the raw stream before the index record that
    /// points at them is written.
    pub fn write_frame(
        &mut self,
        data: &[u8],
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<FrameIndexEntry> {
        let roll = match &self.current {
            None => true,
            Some(seg) => timestamp - seg.start >= self.segment_duration,
        };
        if roll {
            self.roll(timestamp)?;
        }

        let Some(seg) = self.current.as_mut() else {
            anyhow::bail!("no open segment after roll");
        };

        let frame_size = u32::try_from(data.len()).context("frame larger than 4 GiB")?;

        seg.video
            .write_all(data)
            .with_context(|| format!("append frame to {}.h264", seg.base_name))?;
        seg.video.flush()?;

        let entry = FrameIndexEntry {
            frame_number: seg.frame_count,
            timestamp,
            byte_offset: seg.byte_offset,
            frame_size,
            is_keyframe: is_h264_keyframe(data),
        };
        seg.index.write(&entry)?;

        seg.frame_count += 1;
        seg.byte_offset += frame_size as u64;

        if seg.frame_count % 1000 == 0 {
            let n = seg.frame_count;
            self.info(&format!("{} frames recorded", n));
        }

        Ok(entry)
    }

    /// Schließt das aktuelle Segment und öffnet ein neues ab `start`.
    pub fn roll(&mut self, start: DateTime<Utc>) -> anyhow::Result<PathBuf> {
        self.close();

        let dir = camera_dir(&self.base_dir, &self.profile.name, start.date_naive());
        create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

        let base_name = format!("{}_{}", self.profile.name, start.format("%Y%m%d_%H%M%S"));
        let video_file = format!("{}.h264", base_name);
        let index_file = format!("{}.idx", base_name);

        let video = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(&video_file))
            .with_context(|| format!("open {}", video_file))?;
        let index = IndexWriter::create(&dir.join(&index_file))?;

        // Gleicher Name wie ein vorhandenes Segment (Neustart in derselben
        // Sekunde, Uhr zurückgestellt): dahinter weiterschreiben.
        let byte_offset = video
            .metadata()
            .with_context(|| format!("stat {}", video_file))?
            .len();
        let frame_count = u32::try_from(index.records()).context("index record count")?;

        let meta_path = dir.join(format!("{}.json", base_name));
        if byte_offset > 0 || frame_count > 0 {
            self.warn(&format!(
                "resuming segment {} at byte {} / frame {}",
                base_name, byte_offset, frame_count
            ));
        }
        if !meta_path.exists() {
            self.write_sidecar(&meta_path, start, video_file, index_file)?;
        }

        self.info(&format!("new segment {} in {}", base_name, dir.display()));

        self.current = Some(OpenSegment {
            base_name,
            start,
            video,
            index,
            frame_count,
            byte_offset,
        });
        Ok(meta_path)
    }

    fn write_sidecar(
        &self,
        meta_path: &Path,
        start: DateTime<Utc>,
        video_file: String,
        index_file: String,
    ) -> anyhow::Result<()> {
        let meta = SegmentMetadata {
            camera_name: self.profile.name.clone(),
            camera_type: self.profile.camera_type.clone(),
            device_id: self.profile.device_id.clone(),
            width: self.profile.width,
            height: self.profile.height,
            fps: Some(self.profile.fps),
            bitrate: Some(self.profile.bitrate),
            start_time: start,
            video_file,
            index_file,
        };
        meta.save(meta_path)
    }

    pub fn close(&mut self) {
        if let Some(seg) = self.current.take() {
            if let Err(e) = seg.video.sync_all() {
                self.warn(&format!("sync {}.h264 failed: {}", seg.base_name, e));
            }
            if seg.frame_count > 0 {
                self.info(&format!(
                    "segment {} closed: {} frames, {} bytes",
                    seg.base_name, seg.frame_count, seg.byte_offset
                ));
            }
        }
    }

    pub fn current_segment_start(&self) -> Option<DateTime<Utc>> {
        self.current.as_ref().map(|s| s.start)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl ComponentLogger for SegmentRecorder {
    fn log_context(&self) -> LogContext {
        LogContext::new("recorder", &self.profile.name)
    }
}

impl Drop for SegmentRecorder {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::read_index_file;
    use chrono::TimeZone;

    fn profile() -> CameraProfile {
        CameraProfile::new("cam0", 10)
    }

    #[test]
    fn rolls_after_segment_duration() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec =
            SegmentRecorder::new(dir.path().to_path_buf(), profile(), Duration::from_secs(60));

        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        for i in 0..130 {
            let ts = t0 + TimeDelta::milliseconds(i * 1000);
            rec.write_frame(&[0, 0, 0, 1, 0x41, i as u8], ts).unwrap();
        }
        assert_eq!(
            rec.current_segment_start(),
            Some(t0 + TimeDelta::seconds(120))
        );
        rec.close();

        let cam = camera_dir(dir.path(), "cam0", t0.date_naive());
        let first = read_index_file(&cam.join("cam0_20250301_120000.idx"), false).unwrap();
        let second = read_index_file(&cam.join("cam0_20250301_120100.idx"), false).unwrap();
        let third = read_index_file(&cam.join("cam0_20250301_120200.idx"), false).unwrap();

        assert_eq!(first.len(), 60);
        assert_eq!(second.len(), 60);
        assert_eq!(third.len(), 10);
        // jedes Segment beginnt bei Offset 0 und Frame 0
        assert_eq!(second[0].frame_number, 0);
        assert_eq!(second[0].byte_offset, 0);
    }

    #[test]
    fn restart_into_same_segment_continues_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        for run in 0..2u8 {
            let mut rec =
                SegmentRecorder::new(dir.path().to_path_buf(), profile(), Duration::from_secs(60));
            for i in 0..3u8 {
                // zweiter Lauf startet in derselben Sekunde
                let ts = t0 + TimeDelta::milliseconds(i64::from(run * 3 + i) * 100);
                rec.write_frame(&[0, 0, 0, 1, 0x41, run, i], ts).unwrap();
            }
        }

        let cam = camera_dir(dir.path(), "cam0", t0.date_naive());
        let entries = read_index_file(&cam.join("cam0_20250301_120000.idx"), false).unwrap();
        let raw = std::fs::read(cam.join("cam0_20250301_120000.h264")).unwrap();

        assert_eq!(entries.len(), 6);
        let offsets: Vec<u64> = entries.iter().map(|e| e.byte_offset).collect();
        assert_eq!(offsets, vec![0, 7, 14, 21, 28, 35]);
        let numbers: Vec<u32> = entries.iter().map(|e| e.frame_number).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(raw.len() as u64, entries[5].end_offset());

        // jeder Record zeigt auf genau seine Bytes
        for (n, e) in entries.iter().enumerate() {
            let frame = &raw[e.byte_offset as usize..e.end_offset() as usize];
            assert_eq!(frame[5..], [(n / 3) as u8, (n % 3) as u8]);
        }

        // Sidecar des ersten Laufs bleibt stehen
        let meta = SegmentMetadata::load(&cam.join("cam0_20250301_120000.json")).unwrap();
        assert_eq!(meta.start_time, t0);
    }

    #[test]
    fn sidecar_describes_segment() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec =
            SegmentRecorder::new(dir.path().to_path_buf(), profile(), Duration::from_secs(300));
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 15).unwrap();
        let meta_path = rec.roll(t0).unwrap();

        let meta = SegmentMetadata::load(&meta_path).unwrap();
        assert_eq!(meta.camera_name, "cam0");
        assert_eq!(meta.start_time, t0);
        assert_eq!(meta.fps, Some(10));
        assert_eq!(meta.video_file, "cam0_20250301_083015.h264");
        assert_eq!(meta.index_file, "cam0_20250301_083015.idx");
    }
}
