// src/index/codec.rs
//
// Ein Index-Record, little-endian, ohne Padding:
//   frame_number u32 | timestamp f64 (epoch s) | byte_offset u64 | frame_size u32 | is_keyframe u8

use std::io::{self, Cursor, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};

use crate::core::timestamp::{from_epoch_secs, to_epoch_secs};

pub const RECORD_SIZE: usize = size_of::<u32>()
    + size_of::<f64>()
    + size_of::<u64>()
    + size_of::<u32>()
    + size_of::<u8>();

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameIndexEntry {
    pub frame_number: u32,
    pub timestamp: DateTime<Utc>,
    pub byte_offset: u64,
    pub frame_size: u32,
    pub is_keyframe: bool,
}

impl FrameIndexEntry {
    /// First byte after this frame in the raw stream.
    pub fn end_offset(&self) -> u64 {
        self.byte_offset + self.frame_size as u64
    }

    pub fn encode_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.frame_number)?;
        w.write_f64::<LittleEndian>(to_epoch_secs(self.timestamp))?;
        w.write_u64::<LittleEndian>(self.byte_offset)?;
        w.write_u32::<LittleEndian>(self.frame_size)?;
        w.write_u8(self.is_keyframe as u8)?;
        Ok(())
    }

    /// Decodes the record at the start of `buf`.
    ///
    /// `None` when fewer than [`RECORD_SIZE`] bytes are left or the timestamp
    /// is not a real instant; both mean "no complete record here".
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RECORD_SIZE {
            return None;
        }

        let mut cur = Cursor::new(&buf[..RECORD_SIZE]);
        let frame_number = cur.read_u32::<LittleEndian>().ok()?;
        let secs = cur.read_f64::<LittleEndian>().ok()?;
        let byte_offset = cur.read_u64::<LittleEndian>().ok()?;
        let frame_size = cur.read_u32::<LittleEndian>().ok()?;
        let is_keyframe = cur.read_u8().ok()? != 0;

        Some(Self {
            frame_number,
            timestamp: from_epoch_secs(secs)?,
            byte_offset,
            frame_size,
            is_keyframe,
        })
    }
}

/// Decodes every complete record in `buf`, in order.
///
/// Stops silently at a trailing partial record: a file that is still being
/// appended to ends mid-record all the time.
pub fn decode_all(buf: &[u8]) -> Vec<FrameIndexEntry> {
    let mut out = Vec::with_capacity(buf.len() / RECORD_SIZE);
    for chunk in buf.chunks(RECORD_SIZE) {
        match FrameIndexEntry::decode(chunk) {
            Some(entry) => out.push(entry),
            None => break,
        }
    }
    out
}
