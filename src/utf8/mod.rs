//! UTF-8 validation for names and guest-supplied text.
//!
//! Three strategies share one contract: the scalar decoder in [`scalar`] is
//! the reference, [`swar`] skips runs of ASCII eight bytes per word, and
//! [`vector`] classifies 64-byte chunks with nibble lookup tables. Every
//! strategy reports the same `(position, kind)` for the same input because
//! the faster tiers only ever skip bytes they have proven valid and hand the
//! first suspicious window to the scalar decoder.
//!
//! Two policies are supported:
//!
//! - [`Utf8Policy::Rfc3629`] -- well-formed UTF-8 as defined by RFC 3629: no
//!   overlong forms, no surrogates, nothing above U+10FFFF.
//! - [`Utf8Policy::Rfc3629ZeroIllegal`] -- as above, and additionally rejects
//!   U+0000, for text that ends up as a C string on the host side.
//!
//! # Example
//!
//! ```
//! use wasm_boundary::utf8::{self, Utf8ErrorKind, Utf8Policy};
//!
//! assert!(utf8::validate(Utf8Policy::Rfc3629, "héllo".as_bytes()).is_ok());
//!
//! let err = utf8::validate(Utf8Policy::Rfc3629, b"A\xC0\x80B").unwrap_err();
//! assert_eq!((err.position, err.kind), (1, Utf8ErrorKind::OverlongEncoding));
//! ```

pub mod scalar;
pub mod swar;
pub mod vector;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Which flavour of UTF-8 is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Utf8Policy {
    Rfc3629,
    Rfc3629ZeroIllegal,
}

impl Utf8Policy {
    pub fn zero_illegal(self) -> bool {
        matches!(self, Utf8Policy::Rfc3629ZeroIllegal)
    }
}

/// The first fault found in a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum Utf8ErrorKind {
    /// A lead byte of the form `11111xxx`.
    #[error("long header bits")]
    LongHeaderBits,
    /// A multi-byte lead not followed by enough continuation bytes.
    #[error("too short sequence")]
    TooShortSequence,
    /// A continuation byte with no lead byte in front of it.
    #[error("too long sequence")]
    TooLongSequence,
    #[error("overlong encoding")]
    OverlongEncoding,
    /// A four-byte sequence above U+10FFFF.
    #[error("excessive codepoint")]
    ExcessiveCodepoint,
    #[error("illegal surrogate")]
    IllegalSurrogate,
    /// A NUL byte under [`Utf8Policy::Rfc3629ZeroIllegal`].
    #[error("contains empty characters")]
    ContainsEmptyCharacters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("malformed UTF-8 encoding: {kind} at byte {position}")]
pub struct Utf8Error {
    /// Offset of the lead byte of the offending sequence.
    pub position: usize,
    pub kind: Utf8ErrorKind,
}

/// Implementation tier used by [`validate_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Scalar,
    Swar,
    Vector,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Scalar, Strategy::Swar, Strategy::Vector];
}

static DETECTED: Lazy<Strategy> = Lazy::new(|| {
    let strategy = detect();
    tracing::debug!(?strategy, "selected UTF-8 validation strategy");
    strategy
});

fn detect() -> Strategy {
    if vector::accelerated() {
        Strategy::Vector
    } else if cfg!(target_pointer_width = "64") {
        Strategy::Swar
    } else {
        Strategy::Scalar
    }
}

/// The strategy [`validate`] uses on this host, probed once per process.
pub fn detected() -> Strategy {
    *DETECTED
}

/// Validate `bytes` with the fastest strategy available on this host.
pub fn validate(policy: Utf8Policy, bytes: &[u8]) -> Result<(), Utf8Error> {
    validate_with(detected(), policy, bytes)
}

/// Validate `bytes` with an explicit strategy.
pub fn validate_with(strategy: Strategy, policy: Utf8Policy, bytes: &[u8]) -> Result<(), Utf8Error> {
    let zero_illegal = policy.zero_illegal();
    match strategy {
        Strategy::Scalar => scalar::validate_from(bytes, 0, zero_illegal),
        Strategy::Swar => swar::validate(bytes, zero_illegal),
        Strategy::Vector => vector::validate(bytes, zero_illegal),
    }
}
