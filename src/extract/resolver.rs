// src/extract/resolver.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ResolveError;
use crate::index::FrameIndexEntry;

/// How far back the start search may go to find a decodable frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Frames to walk back from the first in-window frame looking for a keyframe.
    pub keyframe_lookback: usize,
    /// Start this many frames early when no keyframe is within reach.
    pub fallback_frames: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            keyframe_lookback: 256,
            fallback_frames: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedRange {
    pub start_index: usize,
    pub end_index: usize,
    pub actual_start: DateTime<Utc>,
    pub actual_end: DateTime<Utc>,
    /// `[byte_start, byte_end)` in the segment's raw stream.
    pub byte_start: u64,
    pub byte_end: u64,
    pub starts_on_keyframe: bool,
}

impl ResolvedRange {
    pub fn frame_count(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_end - self.byte_start
    }
}

/// Maps `[start, end]` onto a keyframe-aligned, inclusive frame range.
///
/// When every frame lies after `end` the whole index is returned; a single
/// segment that was found for the window still yields a clip.
pub fn resolve(
    index: &[FrameIndexEntry],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    cfg: &ResolverConfig,
) -> Result<ResolvedRange, ResolveError> {
    resolve_inner(index, start, end, cfg, true)
}

/// Like [`resolve`], but a window that ends before the first frame is
/// `ResolveError::EndBeforeFirstFrame` instead of the whole index.
///
/// Used per segment when several segments are joined: a segment whose
/// sidecar start precedes its first frame may overlap the window nominally
/// without holding any frame in it.
pub fn resolve_within(
    index: &[FrameIndexEntry],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    cfg: &ResolverConfig,
) -> Result<ResolvedRange, ResolveError> {
    resolve_inner(index, start, end, cfg, false)
}

fn resolve_inner(
    index: &[FrameIndexEntry],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    cfg: &ResolverConfig,
    tail_fallback: bool,
) -> Result<ResolvedRange, ResolveError> {
    let Some(first) = index.first() else {
        return Err(ResolveError::EmptyIndex);
    };

    let start_index = if start < first.timestamp {
        0
    } else {
        let i = index.partition_point(|e| e.timestamp < start);
        if i == index.len() {
            return Err(ResolveError::NoStartFrame { start });
        }
        find_keyframe_before(index, i, cfg)
    };

    let end_index = match index.partition_point(|e| e.timestamp <= end) {
        0 if tail_fallback => index.len() - 1,
        0 => {
            return Err(ResolveError::EndBeforeFirstFrame {
                end,
                first: first.timestamp,
            });
        }
        k => k - 1,
    };

    if start_index > end_index {
        return Err(ResolveError::EmptyRange {
            start_index,
            end_index,
        });
    }

    let s = &index[start_index];
    let e = &index[end_index];

    Ok(ResolvedRange {
        start_index,
        end_index,
        actual_start: s.timestamp,
        actual_end: e.timestamp,
        byte_start: s.byte_offset,
        byte_end: e.end_offset(),
        starts_on_keyframe: s.is_keyframe,
    })
}

fn find_keyframe_before(index: &[FrameIndexEntry], i: usize, cfg: &ResolverConfig) -> usize {
    let floor = i.saturating_sub(cfg.keyframe_lookback);
    match (floor..=i).rev().find(|&j| index[j].is_keyframe) {
        Some(j) => j,
        None => {
            // lieber unpräzise als gar kein Clip
            log::debug!(
                "[resolver] no keyframe within {} frames of #{}, starting {} early",
                cfg.keyframe_lookback,
                i,
                cfg.fallback_frames
            );
            i.saturating_sub(cfg.fallback_frames)
        }
    }
}
