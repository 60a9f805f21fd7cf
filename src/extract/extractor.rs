// src/extract/extractor.rs

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};

use crate::catalog::{Segment, SegmentCatalog};
use crate::core::timestamp::{format_hms_millis, utc_now};
use crate::core::{ExtractError, ExtractResult, FileSnapshot, LogContext};
use crate::index::read_index;

use super::mux::Muxer;
use super::resolver::{ResolvedRange, ResolverConfig, resolve, resolve_within};

pub const EVENT_DIR_PREFIX: &str = "EVENT_";

#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub camera: String,
    pub event_time: DateTime<Utc>,
    pub pre: TimeDelta,
    pub post: TimeDelta,
    /// Nur für Log-Korrelation.
    pub event_seq: Option<u64>,
}

impl ExtractionRequest {
    pub fn new(camera: &str, event_time: DateTime<Utc>, pre_secs: u32, post_secs: u32) -> Self {
        Self {
            camera: camera.to_string(),
            event_time,
            pre: TimeDelta::seconds(pre_secs as i64),
            post: TimeDelta::seconds(post_secs as i64),
            event_seq: None,
        }
    }

    pub fn with_event_seq(mut self, seq: u64) -> Self {
        self.event_seq = Some(seq);
        self
    }

    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.event_time - self.pre, self.event_time + self.post)
    }
}

/// What one segment contributed to a clip.
#[derive(Debug, Clone)]
pub struct ClipSpan {
    pub segment_start: DateTime<Utc>,
    pub video_path: PathBuf,
    pub range: ResolvedRange,
}

#[derive(Debug, Clone)]
pub struct ClipOutcome {
    pub output_path: PathBuf,
    pub fps: u32,
    pub spans: Vec<ClipSpan>,
}

impl ClipOutcome {
    pub fn actual_start(&self) -> Option<DateTime<Utc>> {
        self.spans.first().map(|s| s.range.actual_start)
    }

    pub fn actual_end(&self) -> Option<DateTime<Utc>> {
        self.spans.last().map(|s| s.range.actual_end)
    }

    pub fn frame_count(&self) -> usize {
        self.spans.iter().map(|s| s.range.frame_count()).sum()
    }
}

/// Removes intermediate files on every exit path.
struct TempFiles(Vec<PathBuf>);

impl Drop for TempFiles {
    fn drop(&mut self) {
        for p in &self.0 {
            if let Err(e) = fs::remove_file(p) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("[extract] failed to remove {}: {}", p.display(), e);
                }
            }
        }
    }
}

pub struct Extractor {
    catalog: SegmentCatalog,
    muxer: Box<dyn Muxer>,
    events_dir: PathBuf,
    resolver: ResolverConfig,
    default_fps: u32,
}

impl Extractor {
    pub fn new(
        catalog: SegmentCatalog,
        muxer: Box<dyn Muxer>,
        events_dir: PathBuf,
        resolver: ResolverConfig,
        default_fps: u32,
    ) -> Self {
        Self {
            catalog,
            muxer,
            events_dir,
            resolver,
            default_fps,
        }
    }

    pub fn catalog(&self) -> &SegmentCatalog {
        &self.catalog
    }

    /// `<events>/EVENT_YYYYMMDD/event_<camera>_<YYYYmmdd_HHMMSS>.mp4`
    pub fn output_path_for(&self, camera: &str, event_time: DateTime<Utc>) -> PathBuf {
        self.events_dir
            .join(format!("{}{}", EVENT_DIR_PREFIX, event_time.format("%Y%m%d")))
            .join(format!(
                "event_{}_{}.mp4",
                camera,
                event_time.format("%Y%m%d_%H%M%S")
            ))
    }

    pub fn extract(&self, req: &ExtractionRequest) -> ExtractResult<ClipOutcome> {
        self.extract_at(req, utc_now())
    }

    pub fn extract_at(
        &self,
        req: &ExtractionRequest,
        now: DateTime<Utc>,
    ) -> ExtractResult<ClipOutcome> {
        let ctx = log_context(req);
        let (start, end) = req.window();

        let segments = self.catalog.find_segments_at(&req.camera, start, end, now);
        if segments.is_empty() {
            return Err(ExtractError::NoData {
                camera: req.camera.clone(),
                start,
                end,
            });
        }

        let output = self.output_path_for(&req.camera, req.event_time);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ExtractError::io(format!("create {}", parent.display()), e))?;
        }

        let fps = segments[0].metadata.fps.unwrap_or(self.default_fps);

        log::info!(
            "{}",
            ctx.format(&format!(
                "{} .. {} from {} segment(s) → {}",
                format_hms_millis(start),
                format_hms_millis(end),
                segments.len(),
                output.display()
            ))
        );

        let spans = if segments.len() == 1 {
            vec![self.extract_single(&ctx, &segments[0], start, end, fps, &output)?]
        } else {
            self.extract_multi(&ctx, req, &segments, start, end, fps, &output)?
        };

        let outcome = ClipOutcome {
            output_path: output,
            fps,
            spans,
        };

        if let (Some(s), Some(e)) = (outcome.actual_start(), outcome.actual_end()) {
            log::info!(
                "{}",
                ctx.format(&format!(
                    "clip {} .. {} ({:.1}s, {} frames)",
                    format_hms_millis(s),
                    format_hms_millis(e),
                    (e - s).num_milliseconds() as f64 / 1000.0,
                    outcome.frame_count()
                ))
            );
        }
        Ok(outcome)
    }

    fn extract_single(
        &self,
        ctx: &LogContext,
        segment: &Segment,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        fps: u32,
        output: &Path,
    ) -> ExtractResult<ClipSpan> {
        let index = read_index(segment).map_err(|e| {
            ExtractError::io(format!("read index {}", segment.index_path.display()), e)
        })?;

        if let (Some(first), Some(last)) = (index.first(), index.last()) {
            log::debug!(
                "{}",
                ctx.format(&format!(
                    "index covers {} .. {} ({} frames)",
                    format_hms_millis(first.timestamp),
                    format_hms_millis(last.timestamp),
                    index.len()
                ))
            );
        }

        let range = resolve(&index, start, end, &self.resolver)?;
        log::info!(
            "{}",
            ctx.format(&format!(
                "frames {} ..= {} ({} frames)",
                range.start_index,
                range.end_index,
                range.frame_count()
            ))
        );

        let data = read_segment_range(segment, &range)?;
        self.muxer.mux_bytes(&data, fps, output)?;

        Ok(ClipSpan {
            segment_start: segment.start_time,
            video_path: segment.video_path.clone(),
            range,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn extract_multi(
        &self,
        ctx: &LogContext,
        req: &ExtractionRequest,
        segments: &[Segment],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        fps: u32,
        output: &Path,
    ) -> ExtractResult<Vec<ClipSpan>> {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| req.camera.clone());

        let mut fragments = TempFiles(Vec::new());
        let mut spans = Vec::new();

        for (i, segment) in segments.iter().enumerate() {
            let index = match read_index(segment) {
                Ok(idx) if !idx.is_empty() => idx,
                Ok(_) => {
                    log::warn!("{}", ctx.format(&format!("segment {} has an empty index", i)));
                    continue;
                }
                Err(e) => {
                    log::warn!(
                        "{}",
                        ctx.format(&format!(
                            "index {} unreadable: {}",
                            segment.index_path.display(),
                            e
                        ))
                    );
                    continue;
                }
            };

            // Fenster auf die Spanne dieses Segments beschneiden
            let seg_start = start.max(segment.start_time);
            let seg_end = end.min(segment.effective_end);

            let range = match resolve_within(&index, seg_start, seg_end, &self.resolver) {
                Ok(r) => r,
                Err(e) => {
                    log::warn!("{}", ctx.format(&format!("segment {} skipped: {}", i, e)));
                    continue;
                }
            };

            let data = read_segment_range(segment, &range)?;
            let fragment = output.with_file_name(format!(".{}.part{}.h264", stem, i));
            fragments.0.push(fragment.clone());
            fs::write(&fragment, &data)
                .map_err(|e| ExtractError::io(format!("write {}", fragment.display()), e))?;

            log::debug!(
                "{}",
                ctx.format(&format!(
                    "segment {}: frames {} ..= {} → {} ({} bytes)",
                    i,
                    range.start_index,
                    range.end_index,
                    fragment.display(),
                    data.len()
                ))
            );

            spans.push(ClipSpan {
                segment_start: segment.start_time,
                video_path: segment.video_path.clone(),
                range,
            });
        }

        if fragments.0.is_empty() {
            return Err(ExtractError::NoData {
                camera: req.camera.clone(),
                start,
                end,
            });
        }

        // Fragmente werden beim Drop gelöscht, auch wenn concat fehlschlägt
        self.muxer.concat(&fragments.0, fps, output)?;
        Ok(spans)
    }
}

fn log_context(req: &ExtractionRequest) -> LogContext {
    let ctx = LogContext::new("extract", &req.camera);
    match req.event_seq {
        Some(seq) => ctx.with_event(seq),
        None => ctx,
    }
}

/// Reads `[byte_start, byte_end)` from the segment's raw stream, via a
/// snapshot while the segment is still being written.
fn read_segment_range(segment: &Segment, range: &ResolvedRange) -> ExtractResult<Vec<u8>> {
    let snapshot = if segment.is_current {
        Some(FileSnapshot::take(&segment.video_path).map_err(|e| {
            ExtractError::io(format!("snapshot {}", segment.video_path.display()), e)
        })?)
    } else {
        None
    };
    let path = snapshot
        .as_ref()
        .map(|s| s.path())
        .unwrap_or(segment.video_path.as_path());

    read_range(path, range.byte_start, range.byte_len())
        .map_err(|e| ExtractError::io(format!("read {}", segment.video_path.display()), e))
}

fn read_range(path: &Path, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
