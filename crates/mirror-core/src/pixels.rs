//! Row-stride reconciliation between captured frames and texture memory.
//!
//! Captured rows may carry alignment padding (`stride > width * 4`) and
//! texture rows may be padded too (`pitch > width * 4`). Every copy between
//! the two goes row by row:
//!
//! ```text
//!   src row y: [ visible pixels ........ | padding ]   stride bytes
//!                          │ min(stride, pitch, row_bytes)
//!                          ▼
//!   dst row y: [ visible pixels ........ | pad ]       pitch bytes
//! ```

use crate::errors::TextureError;

/// Gray level used for placeholder frames.
pub const PLACEHOLDER_GRAY: u8 = 64;

/// Bytes needed to hold `height` rows spaced `stride` apart, the last row unpadded.
/// Saturates, so an impossible layout never fits a real buffer.
pub fn required_len(stride: usize, row_bytes: usize, height: usize) -> usize {
    match height {
        0 => 0,
        h => stride.saturating_mul(h - 1).saturating_add(row_bytes),
    }
}

/// Round `value` up to the next multiple of `alignment` (a power of two).
pub fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Copy `height` rows of `row_bytes` visible bytes from `src` into `dst`.
///
/// Each row copies `min(src_stride, dst_pitch, row_bytes)` bytes, so padding
/// on either side is never transferred. A single block copy is used only when
/// both layouts are tightly packed.
pub fn copy_rows(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_pitch: usize,
    row_bytes: usize,
    height: usize,
) -> Result<(), TextureError> {
    let src_stride = if src_stride == 0 { row_bytes } else { src_stride };
    let copy_len = row_bytes.min(src_stride).min(dst_pitch);

    let src_needed = required_len(src_stride, copy_len, height);
    if src.len() < src_needed {
        return Err(TextureError::DataTooSmall {
            got: src.len(),
            expected: src_needed,
        });
    }
    let dst_needed = required_len(dst_pitch, copy_len, height);
    if dst.len() < dst_needed {
        return Err(TextureError::DataTooSmall {
            got: dst.len(),
            expected: dst_needed,
        });
    }

    if src_stride == row_bytes && dst_pitch == row_bytes {
        let total = row_bytes * height;
        dst[..total].copy_from_slice(&src[..total]);
        return Ok(());
    }

    for y in 0..height {
        let s = y * src_stride;
        let d = y * dst_pitch;
        dst[d..d + copy_len].copy_from_slice(&src[s..s + copy_len]);
    }
    Ok(())
}

/// Tightly packed dark-gray BGRA frame used when surface extraction fails.
pub fn placeholder_frame(width: u32, height: u32) -> Vec<u8> {
    vec![PLACEHOLDER_GRAY; width as usize * height as usize * 4]
}
