// src/catalog/mod.rs
//
// Verzeichnislayout:
//   <base>/RECORD_YYYYMMDD/<camera>/<camera>_YYYYmmdd_HHMMSS.{h264,idx,json}

pub mod metadata;

pub use metadata::SegmentMetadata;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use log::{debug, error, info, warn};

use crate::core::timestamp::utc_now;

pub const DAY_DIR_PREFIX: &str = "RECORD_";

pub fn day_dir_name(date: NaiveDate) -> String {
    format!("{}{}", DAY_DIR_PREFIX, date.format("%Y%m%d"))
}

pub fn camera_dir(base_dir: &Path, camera: &str, date: NaiveDate) -> PathBuf {
    base_dir.join(day_dir_name(date)).join(camera)
}

/// One rolling recording window of one camera.
#[derive(Debug, Clone)]
pub struct Segment {
    pub camera: String,
    pub start_time: DateTime<Utc>,
    pub duration: TimeDelta,
    pub video_path: PathBuf,
    pub index_path: PathBuf,
    pub metadata: SegmentMetadata,
    /// `start + duration` or "now" while the segment is still open.
    pub effective_end: DateTime<Utc>,
    pub is_current: bool,
}

impl Segment {
    pub fn nominal_end(&self) -> DateTime<Utc> {
        self.start_time + self.duration
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        !(end < self.start_time || start > self.effective_end)
    }
}

pub struct SegmentCatalog {
    base_dir: PathBuf,
    segment_duration: TimeDelta,
}

impl SegmentCatalog {
    pub fn new(base_dir: PathBuf, segment_duration: Duration) -> Self {
        Self {
            base_dir,
            segment_duration: TimeDelta::from_std(segment_duration)
                .unwrap_or_else(|_| TimeDelta::seconds(300)),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn find_segments(
        &self,
        camera: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Segment> {
        self.find_segments_at(camera, start, end, utc_now())
    }

    /// Every segment of `camera` overlapping `[start, end]`, oldest first.
    ///
    /// Broken segments (missing raw/index file, unreadable sidecar) are logged
    /// and skipped. `is_current` is derived from `now` on every call.
    pub fn find_segments_at(
        &self,
        camera: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<Segment> {
        debug!("[catalog] search {}: {} .. {}", camera, start, end);

        let mut segments = Vec::new();

        // ein Segment von kurz vor Mitternacht liegt im Ordner des Vortags
        let first_day = (start - self.segment_duration).date_naive();
        let last_day = end.date_naive();

        for day in first_day.iter_days().take_while(|d| *d <= last_day) {
            let dir = camera_dir(&self.base_dir, camera, day);
            if !dir.is_dir() {
                debug!("[catalog] no directory {}", dir.display());
                continue;
            }
            self.scan_camera_dir(&dir, start, end, now, &mut segments);
        }

        segments.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.video_path.cmp(&b.video_path))
        });

        info!("[catalog] {}: {} segment(s) for {} .. {}", camera, segments.len(), start, end);
        segments
    }

    fn scan_camera_dir(
        &self,
        dir: &Path,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
        out: &mut Vec<Segment>,
    ) {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!("[catalog] cannot list {}: {}", dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let meta = match SegmentMetadata::load(&path) {
                Ok(m) => m,
                Err(e) => {
                    error!("[catalog] metadata unreadable {}: {:#}", path.display(), e);
                    continue;
                }
            };

            let segment = self.segment_from(dir, meta, now);
            if !segment.overlaps(start, end) {
                continue;
            }

            if !segment.video_path.exists() {
                warn!("[catalog] raw stream missing: {}", segment.video_path.display());
                continue;
            }
            if !segment.index_path.exists() {
                warn!("[catalog] index missing: {}", segment.index_path.display());
                continue;
            }

            debug!(
                "[catalog] + {} ({} .. {}, current={})",
                path.display(),
                segment.start_time,
                segment.effective_end,
                segment.is_current
            );
            out.push(segment);
        }
    }

    fn segment_from(&self, dir: &Path, meta: SegmentMetadata, now: DateTime<Utc>) -> Segment {
        let nominal_end = meta.start_time + self.segment_duration;
        let is_current = nominal_end > now;

        Segment {
            camera: meta.camera_name.clone(),
            start_time: meta.start_time,
            duration: self.segment_duration,
            video_path: dir.join(&meta.video_file),
            index_path: dir.join(&meta.index_file),
            effective_end: if is_current { now } else { nominal_end },
            is_current,
            metadata: meta,
        }
    }
}
