//! WASI error codes used by the host calls in this crate.
//!
//! # Specification
//!
//! See: <https://github.com/WebAssembly/WASI/blob/wasi-0.1/preview1/docs.md#errno>

/// WASI error codes (errno values), numbered as in WASI preview1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[repr(u32)]
pub enum WasiErrno {
    /// No error occurred
    #[error("success")]
    Success = 0,
    /// Bad file descriptor
    #[error("bad file descriptor")]
    BadF = 8,
    /// Bad address
    #[error("bad address")]
    Fault = 21,
    /// Illegal byte sequence
    #[error("illegal byte sequence")]
    Ilseq = 25,
    /// Invalid argument
    #[error("invalid argument")]
    Inval = 28,
    /// I/O error
    #[error("I/O error")]
    Io = 29,
    /// Value too large to be stored in data type
    #[error("value too large")]
    Overflow = 61,
}

impl WasiErrno {
    /// Get the numeric value of this errno
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl From<WasiErrno> for u32 {
    fn from(errno: WasiErrno) -> u32 {
        errno.as_u32()
    }
}

/// Collapse a host-call result into the errno returned to the guest.
pub fn errno_of<T>(result: &Result<T, WasiErrno>) -> u32 {
    match result {
        Ok(_) => WasiErrno::Success.as_u32(),
        Err(errno) => errno.as_u32(),
    }
}
