// src/index/reader.rs

use std::fs;
use std::path::Path;

use crate::catalog::Segment;
use crate::core::FileSnapshot;

use super::codec::{FrameIndexEntry, decode_all};

/// Reads a segment's index in file order (= timestamp order).
///
/// The open segment is read through a snapshot so the length cannot change
/// under the reader.
pub fn read_index(segment: &Segment) -> std::io::Result<Vec<FrameIndexEntry>> {
    read_index_file(&segment.index_path, segment.is_current)
}

pub fn read_index_file(path: &Path, is_current: bool) -> std::io::Result<Vec<FrameIndexEntry>> {
    let bytes = if is_current {
        let snap = FileSnapshot::take(path)?;
        fs::read(snap.path())?
        // snap wird hier verworfen
    } else {
        fs::read(path)?
    };

    let entries = decode_all(&bytes);
    log::debug!(
        "[index] {}: {} frames ({} bytes{})",
        path.display(),
        entries.len(),
        bytes.len(),
        if is_current { ", snapshot" } else { "" }
    );
    Ok(entries)
}
