// src/recorder/keyframe.rs

const SCAN_LIMIT: usize = 100;
const NAL_IDR: u8 = 5;

/// True if an H.264 IDR slice starts within the first bytes of an
/// Annex-B access unit. SPS/PPS usually come first, so a few NAL units are
/// walked before giving up.
pub fn is_h264_keyframe(data: &[u8]) -> bool {
    if data.len() <= 4 {
        return false;
    }

    let limit = SCAN_LIMIT.min(data.len() - 4);
    let mut i = 0;
    while i < limit {
        let header = if data[i..].starts_with(&[0, 0, 1]) {
            i += 3;
            data[i]
        } else if data[i..].starts_with(&[0, 0, 0, 1]) {
            i += 4;
            data[i]
        } else {
            i += 1;
            continue;
        };

        if header & 0x1F == NAL_IDR {
            return true;
        }
    }
    false
}
