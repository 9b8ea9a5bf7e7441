//! Host-side view of a WebAssembly instance's linear memory.
//!
//! [`memory::LinearMemory`] owns the buffer and grows it, [`gate`] keeps
//! accesses and growth apart, [`access`] provides the bounds-checked
//! operations host calls use, and [`fault`] reports the accesses that must
//! never happen. [`wasi`] is a host-call layer built on top of them.

pub mod access;
pub mod fault;
pub mod gate;
pub mod memory;
pub mod wasi;

pub use access::{GuestAddress, WasmScalar};
pub use fault::{FaultKind, MemoryFault, TrapPolicy};
pub use memory::{LinearMemory, MemoryConfig, MemoryGuard};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Memory error: {0}")]
    MemoryError(String),
    #[error("Page size {0} is not a power of two")]
    InvalidPageSize(u64),
}
