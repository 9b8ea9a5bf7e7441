//! Byte-at-a-time reference decoder.
//!
//! The other strategies call [`step`] whenever they meet bytes they cannot
//! prove valid, so this file defines what "valid" means for the whole module.

use super::{Utf8Error, Utf8ErrorKind};

/// Smallest code point that needs a sequence of the given length.
const MIN_FOR_LEN: [u32; 5] = [0, 0, 0x80, 0x800, 0x1_0000];

#[inline]
fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Length of the sequence introduced by a lead byte, judged by its high bits
/// alone. Continuation bytes and `11111xxx` yield `None`.
#[inline]
pub(crate) fn sequence_len(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC0..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF7 => Some(4),
        _ => None,
    }
}

/// Decode the sequence starting at `pos` and return its length.
///
/// `pos` must be in bounds. Errors are attributed to the lead byte.
#[inline]
pub(crate) fn step(bytes: &[u8], pos: usize, zero_illegal: bool) -> Result<usize, Utf8ErrorKind> {
    let lead = bytes[pos];

    if lead < 0x80 {
        if lead == 0 && zero_illegal {
            return Err(Utf8ErrorKind::ContainsEmptyCharacters);
        }
        return Ok(1);
    }

    let len = match sequence_len(lead) {
        Some(len) => len,
        None if is_continuation(lead) => return Err(Utf8ErrorKind::TooLongSequence),
        None => return Err(Utf8ErrorKind::LongHeaderBits),
    };

    let tail = match bytes.get(pos + 1..pos + len) {
        Some(tail) => tail,
        None => return Err(Utf8ErrorKind::TooShortSequence),
    };

    let mut code_point = u32::from(lead) & (0x7F >> len);
    for &byte in tail {
        if !is_continuation(byte) {
            return Err(Utf8ErrorKind::TooShortSequence);
        }
        code_point = (code_point << 6) | u32::from(byte & 0x3F);
    }

    if code_point < MIN_FOR_LEN[len] {
        return Err(Utf8ErrorKind::OverlongEncoding);
    }
    if len == 3 && (0xD800..=0xDFFF).contains(&code_point) {
        return Err(Utf8ErrorKind::IllegalSurrogate);
    }
    if len == 4 && code_point > 0x10_FFFF {
        return Err(Utf8ErrorKind::ExcessiveCodepoint);
    }

    Ok(len)
}

/// Validate `bytes[start..]`, where `start` sits on a sequence boundary.
pub(crate) fn validate_from(bytes: &[u8], start: usize, zero_illegal: bool) -> Result<(), Utf8Error> {
    let mut pos = start;
    while pos < bytes.len() {
        match step(bytes, pos, zero_illegal) {
            Ok(len) => pos += len,
            Err(kind) => return Err(Utf8Error { position: pos, kind }),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(bytes: &[u8]) -> Result<(), (usize, Utf8ErrorKind)> {
        validate_from(bytes, 0, false).map_err(|e| (e.position, e.kind))
    }

    #[test]
    fn test_accepts_boundaries_of_each_length() {
        assert_eq!(check(b"\x7F"), Ok(()));
        assert_eq!(check(b"\xC2\x80"), Ok(()));
        assert_eq!(check(b"\xDF\xBF"), Ok(()));
        assert_eq!(check(b"\xE0\xA0\x80"), Ok(()));
        assert_eq!(check(b"\xED\x9F\xBF"), Ok(()));
        assert_eq!(check(b"\xEE\x80\x80"), Ok(()));
        assert_eq!(check(b"\xF0\x90\x80\x80"), Ok(()));
        assert_eq!(check(b"\xF4\x8F\xBF\xBF"), Ok(()));
    }

    #[test]
    fn test_rejects_overlong() {
        assert_eq!(check(b"\xC1\xBF"), Err((0, Utf8ErrorKind::OverlongEncoding)));
        assert_eq!(check(b"x\xE0\x9F\xBF"), Err((1, Utf8ErrorKind::OverlongEncoding)));
        assert_eq!(check(b"\xF0\x8F\xBF\xBF"), Err((0, Utf8ErrorKind::OverlongEncoding)));
    }

    #[test]
    fn test_rejects_surrogates_and_large_code_points() {
        assert_eq!(check(b"\xED\xA0\x80"), Err((0, Utf8ErrorKind::IllegalSurrogate)));
        assert_eq!(check(b"\xED\xBF\xBF"), Err((0, Utf8ErrorKind::IllegalSurrogate)));
        assert_eq!(check(b"\xF4\x90\x80\x80"), Err((0, Utf8ErrorKind::ExcessiveCodepoint)));
        assert_eq!(check(b"\xF7\xBF\xBF\xBF"), Err((0, Utf8ErrorKind::ExcessiveCodepoint)));
    }

    #[test]
    fn test_rejects_bad_structure() {
        assert_eq!(check(b"ab\x80"), Err((2, Utf8ErrorKind::TooLongSequence)));
        assert_eq!(check(b"\xF8\x88\x80\x80\x80"), Err((0, Utf8ErrorKind::LongHeaderBits)));
        assert_eq!(check(b"\xFF"), Err((0, Utf8ErrorKind::LongHeaderBits)));
        assert_eq!(check(b"\xE2\x82"), Err((0, Utf8ErrorKind::TooShortSequence)));
        assert_eq!(check(b"\xE2\x82A"), Err((0, Utf8ErrorKind::TooShortSequence)));
        assert_eq!(check(b"a\xC3"), Err((1, Utf8ErrorKind::TooShortSequence)));
    }

    #[test]
    fn test_zero_policy() {
        assert_eq!(validate_from(b"a\0", 0, false), Ok(()));
        assert_eq!(
            validate_from(b"a\0", 0, true),
            Err(Utf8Error { position: 1, kind: Utf8ErrorKind::ContainsEmptyCharacters })
        );
    }

    #[test]
    fn test_sequence_len() {
        assert_eq!(sequence_len(b'a'), Some(1));
        assert_eq!(sequence_len(0xC3), Some(2));
        assert_eq!(sequence_len(0xE2), Some(3));
        assert_eq!(sequence_len(0xF0), Some(4));
        assert_eq!(sequence_len(0x80), None);
        assert_eq!(sequence_len(0xF8), None);
    }
}
