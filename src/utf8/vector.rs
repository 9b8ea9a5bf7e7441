//! Vector tier: 64-byte chunks classified with nibble lookup tables.
//!
//! Each byte is checked against its predecessor by looking up three 16-entry
//! tables (high nibble of the previous byte, low nibble of the previous byte,
//! high nibble of the current byte) and AND-ing the results; any bit that
//! survives names an error class. A separate test confirms that every byte
//! two or three positions after a three- or four-byte lead is a continuation.
//!
//! This tier only proves a prefix of the input valid. It tracks the last
//! sequence boundary it has vouched for and, as soon as a chunk shows an
//! error, a NUL under the zero-illegal policy, or fewer than 64 bytes remain,
//! the scalar decoder takes over from that boundary. Positions and error
//! kinds therefore always come from [`scalar`](super::scalar).
//!
//! Lanes are abstracted by [`Block`]. [`Lanes`] is a portable sixteen-byte
//! array; on x86_64 hosts with SSSE3 the same driver runs on `__m128i`.

use super::{scalar, Utf8Error};

const CHUNK: usize = 64;
const LANES: usize = 16;

// Error classes, one bit each. OVERLONG_4 and TOO_LARGE_1000 share a bit:
// they are told apart by the high nibble of the previous byte.
const TOO_SHORT: u8 = 1 << 0;
const TOO_LONG: u8 = 1 << 1;
const OVERLONG_3: u8 = 1 << 2;
const TOO_LARGE: u8 = 1 << 3;
const SURROGATE: u8 = 1 << 4;
const OVERLONG_2: u8 = 1 << 5;
const TOO_LARGE_1000: u8 = 1 << 6;
const OVERLONG_4: u8 = 1 << 6;
const TWO_CONTS: u8 = 1 << 7;
const CARRY: u8 = TOO_SHORT | TOO_LONG | TWO_CONTS;

#[rustfmt::skip]
const BYTE_1_HIGH: [u8; 16] = [
    // 0xxx: ASCII
    TOO_LONG, TOO_LONG, TOO_LONG, TOO_LONG,
    TOO_LONG, TOO_LONG, TOO_LONG, TOO_LONG,
    // 10xx: continuation
    TWO_CONTS, TWO_CONTS, TWO_CONTS, TWO_CONTS,
    // 1100, 1101: two-byte lead
    TOO_SHORT | OVERLONG_2,
    TOO_SHORT,
    // 1110: three-byte lead
    TOO_SHORT | OVERLONG_3 | SURROGATE,
    // 1111: four-byte lead or worse
    TOO_SHORT | TOO_LARGE | TOO_LARGE_1000 | OVERLONG_4,
];

#[rustfmt::skip]
const BYTE_1_LOW: [u8; 16] = [
    CARRY | OVERLONG_3 | OVERLONG_2 | OVERLONG_4,
    CARRY | OVERLONG_2,
    CARRY,
    CARRY,
    CARRY | TOO_LARGE,
    CARRY | TOO_LARGE | TOO_LARGE_1000,
    CARRY | TOO_LARGE | TOO_LARGE_1000,
    CARRY | TOO_LARGE | TOO_LARGE_1000,
    CARRY | TOO_LARGE | TOO_LARGE_1000,
    CARRY | TOO_LARGE | TOO_LARGE_1000,
    CARRY | TOO_LARGE | TOO_LARGE_1000,
    CARRY | TOO_LARGE | TOO_LARGE_1000,
    CARRY | TOO_LARGE | TOO_LARGE_1000,
    CARRY | TOO_LARGE | TOO_LARGE_1000 | SURROGATE,
    CARRY | TOO_LARGE | TOO_LARGE_1000,
    CARRY | TOO_LARGE | TOO_LARGE_1000,
];

#[rustfmt::skip]
const BYTE_2_HIGH: [u8; 16] = [
    // 0xxx: ASCII
    TOO_SHORT, TOO_SHORT, TOO_SHORT, TOO_SHORT,
    TOO_SHORT, TOO_SHORT, TOO_SHORT, TOO_SHORT,
    // 1000
    TOO_LONG | OVERLONG_2 | TWO_CONTS | OVERLONG_3 | TOO_LARGE_1000 | OVERLONG_4,
    // 1001
    TOO_LONG | OVERLONG_2 | TWO_CONTS | OVERLONG_3 | TOO_LARGE,
    // 101x
    TOO_LONG | OVERLONG_2 | TWO_CONTS | SURROGATE | TOO_LARGE,
    TOO_LONG | OVERLONG_2 | TWO_CONTS | SURROGATE | TOO_LARGE,
    // 11xx: a lead where a continuation was due
    TOO_SHORT, TOO_SHORT, TOO_SHORT, TOO_SHORT,
];

/// A block that ends in any of these lanes with a larger byte is cut off in
/// the middle of a multi-byte sequence.
#[rustfmt::skip]
const INCOMPLETE_MAX: [u8; 16] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xEF, 0xDF, 0xBF,
];

/// Sixteen byte lanes.
trait Block: Copy {
    fn load(bytes: &[u8]) -> Self;
    fn splat(value: u8) -> Self;
    fn table(values: &[u8; 16]) -> Self;
    fn and(self, other: Self) -> Self;
    fn or(self, other: Self) -> Self;
    fn xor(self, other: Self) -> Self;
    fn saturating_sub(self, other: Self) -> Self;
    /// Shift every lane right by four bits.
    fn high_nibbles(self) -> Self;
    /// Use each lane (< 16) as an index into `table`.
    fn lookup(self, table: Self) -> Self;
    /// Lanes shifted by one, two or three positions, with the vacated lanes
    /// filled from the tail of `prev`.
    fn prev1(self, prev: Self) -> Self;
    fn prev2(self, prev: Self) -> Self;
    fn prev3(self, prev: Self) -> Self;
    fn any_set(self) -> bool;
    fn any_high_bit(self) -> bool;
    fn any_zero(self) -> bool;
}

#[derive(Clone, Copy)]
struct Lanes([u8; LANES]);

impl Lanes {
    #[inline(always)]
    fn map2(self, other: Self, f: impl Fn(u8, u8) -> u8) -> Self {
        let mut out = [0u8; LANES];
        for (i, lane) in out.iter_mut().enumerate() {
            *lane = f(self.0[i], other.0[i]);
        }
        Lanes(out)
    }

    #[inline(always)]
    fn shifted(self, prev: Self, by: usize) -> Self {
        let mut out = [0u8; LANES];
        for (i, lane) in out.iter_mut().enumerate() {
            *lane = if i >= by { self.0[i - by] } else { prev.0[LANES - by + i] };
        }
        Lanes(out)
    }
}

impl Block for Lanes {
    #[inline(always)]
    fn load(bytes: &[u8]) -> Self {
        let mut out = [0u8; LANES];
        out.copy_from_slice(&bytes[..LANES]);
        Lanes(out)
    }

    #[inline(always)]
    fn splat(value: u8) -> Self {
        Lanes([value; LANES])
    }

    #[inline(always)]
    fn table(values: &[u8; 16]) -> Self {
        Lanes(*values)
    }

    #[inline(always)]
    fn and(self, other: Self) -> Self {
        self.map2(other, |a, b| a & b)
    }

    #[inline(always)]
    fn or(self, other: Self) -> Self {
        self.map2(other, |a, b| a | b)
    }

    #[inline(always)]
    fn xor(self, other: Self) -> Self {
        self.map2(other, |a, b| a ^ b)
    }

    #[inline(always)]
    fn saturating_sub(self, other: Self) -> Self {
        self.map2(other, u8::saturating_sub)
    }

    #[inline(always)]
    fn high_nibbles(self) -> Self {
        Lanes(self.0.map(|b| b >> 4))
    }

    #[inline(always)]
    fn lookup(self, table: Self) -> Self {
        Lanes(self.0.map(|b| table.0[usize::from(b & 0x0F)]))
    }

    #[inline(always)]
    fn prev1(self, prev: Self) -> Self {
        self.shifted(prev, 1)
    }

    #[inline(always)]
    fn prev2(self, prev: Self) -> Self {
        self.shifted(prev, 2)
    }

    #[inline(always)]
    fn prev3(self, prev: Self) -> Self {
        self.shifted(prev, 3)
    }

    #[inline(always)]
    fn any_set(self) -> bool {
        self.0.iter().any(|&b| b != 0)
    }

    #[inline(always)]
    fn any_high_bit(self) -> bool {
        self.0.iter().any(|&b| b & 0x80 != 0)
    }

    #[inline(always)]
    fn any_zero(self) -> bool {
        self.0.contains(&0)
    }
}

#[inline(always)]
fn special_cases<B: Block>(input: B, prev1: B) -> B {
    let byte_1_high = prev1.high_nibbles().lookup(B::table(&BYTE_1_HIGH));
    let byte_1_low = prev1.and(B::splat(0x0F)).lookup(B::table(&BYTE_1_LOW));
    let byte_2_high = input.high_nibbles().lookup(B::table(&BYTE_2_HIGH));
    byte_1_high.and(byte_1_low).and(byte_2_high)
}

#[inline(always)]
fn block_errors<B: Block>(input: B, prev_input: B) -> B {
    let prev1 = input.prev1(prev_input);
    let special = special_cases(input, prev1);

    // Bytes two after a 111xxxxx lead or three after a 1111xxxx lead must be
    // continuations; the lookup above flags them as TWO_CONTS, so the two
    // cancel exactly when the structure is right.
    let third = input.prev2(prev_input).saturating_sub(B::splat(0xE0 - 0x80));
    let fourth = input.prev3(prev_input).saturating_sub(B::splat(0xF0 - 0x80));
    let must_continue = third.or(fourth).and(B::splat(0x80));
    must_continue.xor(special)
}

#[inline(always)]
fn is_incomplete<B: Block>(block: B) -> bool {
    block.saturating_sub(B::table(&INCOMPLETE_MAX)).any_set()
}

/// Start of a multi-byte sequence cut off by the end of `bytes[..end]`, if
/// any. The caller has already established that the structure up to `end`
/// is consistent.
fn incomplete_tail(bytes: &[u8], end: usize) -> usize {
    for back in 1..=3 {
        let byte = bytes[end - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        if byte >= 0xC0 {
            let needed = scalar::sequence_len(byte).unwrap_or(4);
            if needed > back {
                return end - back;
            }
        }
        break;
    }
    end
}

/// Length of the prefix of `bytes` proven valid, always on a sequence
/// boundary.
#[inline(always)]
fn valid_prefix<B: Block>(bytes: &[u8], zero_illegal: bool) -> usize {
    let mut boundary = 0;
    let mut pos = 0;
    let mut prev_input = B::splat(0);
    let mut prev_incomplete = false;

    while bytes.len() - pos >= CHUNK {
        let blocks = [
            B::load(&bytes[pos..]),
            B::load(&bytes[pos + LANES..]),
            B::load(&bytes[pos + 2 * LANES..]),
            B::load(&bytes[pos + 3 * LANES..]),
        ];

        if zero_illegal && blocks.iter().any(|b| b.any_zero()) {
            break;
        }

        let non_ascii = blocks[0].or(blocks[1]).or(blocks[2]).or(blocks[3]).any_high_bit();
        let end = pos + CHUNK;
        if non_ascii {
            let mut errors = block_errors(blocks[0], prev_input);
            errors = errors.or(block_errors(blocks[1], blocks[0]));
            errors = errors.or(block_errors(blocks[2], blocks[1]));
            errors = errors.or(block_errors(blocks[3], blocks[2]));
            if errors.any_set() {
                break;
            }
            prev_incomplete = is_incomplete(blocks[3]);
            boundary = incomplete_tail(bytes, end);
        } else {
            if prev_incomplete {
                break;
            }
            boundary = end;
        }

        prev_input = blocks[3];
        pos = end;
    }

    boundary
}

#[cfg(target_arch = "x86_64")]
mod ssse3 {
    use super::{valid_prefix, Block, LANES};
    use std::arch::x86_64::*;

    /// SSSE3 lanes. Values of this type are only created inside
    /// [`valid_prefix_ssse3`], which the caller enters after feature
    /// detection, so every intrinsic below runs on a CPU that has it.
    #[derive(Clone, Copy)]
    pub(super) struct Ssse3(__m128i);

    impl Block for Ssse3 {
        #[inline(always)]
        fn load(bytes: &[u8]) -> Self {
            assert!(bytes.len() >= LANES);
            // SAFETY: sixteen readable bytes checked above; unaligned load.
            Ssse3(unsafe { _mm_loadu_si128(bytes.as_ptr() as *const __m128i) })
        }

        #[inline(always)]
        fn splat(value: u8) -> Self {
            Ssse3(unsafe { _mm_set1_epi8(value as i8) })
        }

        #[inline(always)]
        fn table(values: &[u8; 16]) -> Self {
            Self::load(values)
        }

        #[inline(always)]
        fn and(self, other: Self) -> Self {
            Ssse3(unsafe { _mm_and_si128(self.0, other.0) })
        }

        #[inline(always)]
        fn or(self, other: Self) -> Self {
            Ssse3(unsafe { _mm_or_si128(self.0, other.0) })
        }

        #[inline(always)]
        fn xor(self, other: Self) -> Self {
            Ssse3(unsafe { _mm_xor_si128(self.0, other.0) })
        }

        #[inline(always)]
        fn saturating_sub(self, other: Self) -> Self {
            Ssse3(unsafe { _mm_subs_epu8(self.0, other.0) })
        }

        #[inline(always)]
        fn high_nibbles(self) -> Self {
            Ssse3(unsafe { _mm_and_si128(_mm_srli_epi16(self.0, 4), _mm_set1_epi8(0x0F)) })
        }

        #[inline(always)]
        fn lookup(self, table: Self) -> Self {
            Ssse3(unsafe { _mm_shuffle_epi8(table.0, self.0) })
        }

        #[inline(always)]
        fn prev1(self, prev: Self) -> Self {
            Ssse3(unsafe { _mm_alignr_epi8(self.0, prev.0, 15) })
        }

        #[inline(always)]
        fn prev2(self, prev: Self) -> Self {
            Ssse3(unsafe { _mm_alignr_epi8(self.0, prev.0, 14) })
        }

        #[inline(always)]
        fn prev3(self, prev: Self) -> Self {
            Ssse3(unsafe { _mm_alignr_epi8(self.0, prev.0, 13) })
        }

        #[inline(always)]
        fn any_set(self) -> bool {
            unsafe { _mm_movemask_epi8(_mm_cmpeq_epi8(self.0, _mm_setzero_si128())) != 0xFFFF }
        }

        #[inline(always)]
        fn any_high_bit(self) -> bool {
            unsafe { _mm_movemask_epi8(self.0) != 0 }
        }

        #[inline(always)]
        fn any_zero(self) -> bool {
            unsafe { _mm_movemask_epi8(_mm_cmpeq_epi8(self.0, _mm_setzero_si128())) != 0 }
        }
    }

    /// # Safety
    ///
    /// The CPU must support SSSE3.
    #[target_feature(enable = "ssse3")]
    pub(super) unsafe fn valid_prefix_ssse3(bytes: &[u8], zero_illegal: bool) -> usize {
        valid_prefix::<Ssse3>(bytes, zero_illegal)
    }
}

/// Whether this host runs the vector tier on real vector registers rather
/// than the portable lanes.
pub fn accelerated() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        is_x86_feature_detected!("ssse3")
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

fn prefix(bytes: &[u8], zero_illegal: bool) -> usize {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("ssse3") {
            // SAFETY: feature detected at runtime.
            return unsafe { ssse3::valid_prefix_ssse3(bytes, zero_illegal) };
        }
    }
    valid_prefix::<Lanes>(bytes, zero_illegal)
}

pub(crate) fn validate(bytes: &[u8], zero_illegal: bool) -> Result<(), Utf8Error> {
    let start = prefix(bytes, zero_illegal);
    scalar::validate_from(bytes, start, zero_illegal)
}
