//! Fatal guest-memory faults.
//!
//! A checked accessor that finds an access outside linear memory does not
//! return an error: the caller was required to have excluded the access
//! already, so reaching the check means the host is broken. The fault is
//! logged as a structured record and the process terminates (or, under
//! [`TrapPolicy::Unwind`], the current thread panics with the record as
//! payload).

use serde::{Deserialize, Serialize};

/// What happens after a fault has been reported.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrapPolicy {
    /// Abort the process.
    #[default]
    Abort,
    /// Panic with the [`MemoryFault`] as payload. Embedders that isolate each
    /// instance on its own thread can recover it with `catch_unwind`.
    Unwind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// `offset + size` reaches past the current memory length.
    OutOfBounds,
    /// The guest address does not fit in the host's `usize`.
    AddressOverflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[error(
    "{kind:?}: memory {memory_idx}, offset {memory_offset} (+{memory_static_offset}), \
     access size {memory_type_size}, memory length {memory_length}"
)]
pub struct MemoryFault {
    pub kind: FaultKind,
    pub memory_idx: usize,
    pub memory_offset: u64,
    pub memory_static_offset: u64,
    pub memory_length: u64,
    pub memory_type_size: u64,
}

#[cold]
#[inline(never)]
pub fn trap(policy: TrapPolicy, fault: MemoryFault) -> ! {
    tracing::error!(
        kind = ?fault.kind,
        memory_idx = fault.memory_idx,
        memory_offset = fault.memory_offset,
        memory_static_offset = fault.memory_static_offset,
        memory_length = fault.memory_length,
        memory_type_size = fault.memory_type_size,
        "guest memory access fault"
    );

    match policy {
        TrapPolicy::Abort => std::process::abort(),
        TrapPolicy::Unwind => std::panic::panic_any(fault),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};

    #[test]
    fn test_unwind_carries_fault() {
        let fault = MemoryFault {
            kind: FaultKind::OutOfBounds,
            memory_idx: 0,
            memory_offset: 8,
            memory_static_offset: 0,
            memory_length: 10,
            memory_type_size: 4,
        };
        let payload = panic::catch_unwind(AssertUnwindSafe(|| trap(TrapPolicy::Unwind, fault))).unwrap_err();
        assert_eq!(payload.downcast_ref::<MemoryFault>(), Some(&fault));
    }

    #[test]
    fn test_display() {
        let fault = MemoryFault {
            kind: FaultKind::AddressOverflow,
            memory_idx: 1,
            memory_offset: 1 << 40,
            memory_static_offset: 0,
            memory_length: 65536,
            memory_type_size: 4,
        };
        assert_eq!(
            fault.to_string(),
            "AddressOverflow: memory 1, offset 1099511627776 (+0), access size 4, memory length 65536"
        );
    }
}
