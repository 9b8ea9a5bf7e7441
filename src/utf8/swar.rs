//! Word-parallel tier: two 64-bit words per 16-byte window.

use byteorder::{ByteOrder, LittleEndian};

use super::{scalar, Utf8Error};

const WINDOW: usize = 16;
const HIGH: u64 = 0x8080_8080_8080_8080;
const LOW7: u64 = 0x7F7F_7F7F_7F7F_7F7F;

#[inline]
fn is_ascii(word: u64) -> bool {
    word & HIGH == 0
}

/// Non-zero iff some byte of `word` is 0x00. No carries cross byte lanes
/// because `(b & 0x7F) + 0x7F` never exceeds 0xFE.
#[inline]
fn has_zero_byte(word: u64) -> bool {
    !(((word & LOW7).wrapping_add(LOW7)) | word | LOW7) != 0
}

#[inline]
fn window_is_clean(word: u64, zero_illegal: bool) -> bool {
    is_ascii(word) && !(zero_illegal && has_zero_byte(word))
}

pub(crate) fn validate(bytes: &[u8], zero_illegal: bool) -> Result<(), Utf8Error> {
    let mut pos = 0;

    while bytes.len() - pos >= WINDOW {
        let lo = LittleEndian::read_u64(&bytes[pos..pos + 8]);
        let hi = LittleEndian::read_u64(&bytes[pos + 8..pos + WINDOW]);
        if window_is_clean(lo, zero_illegal) && window_is_clean(hi, zero_illegal) {
            pos += WINDOW;
            continue;
        }

        // Decode sequence by sequence until past the window; the last
        // sequence may straddle into the next one.
        let window_end = pos + WINDOW;
        while pos < window_end {
            match scalar::step(bytes, pos, zero_illegal) {
                Ok(len) => pos += len,
                Err(kind) => return Err(Utf8Error { position: pos, kind }),
            }
        }
    }

    scalar::validate_from(bytes, pos, zero_illegal)
}
