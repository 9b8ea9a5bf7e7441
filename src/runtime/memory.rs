//! WebAssembly linear memory that can be shared between host threads.
//!
//! Memory is grow-only: its length never decreases, so a range that was in
//! bounds once stays in bounds. Growing always moves the contents into a new
//! allocation. Every access therefore runs under a [`MemoryGuard`], and
//! [`LinearMemory::grow`] waits until no guard is live before replacing the
//! buffer (see [`super::gate`]).
//!
//! Bytes are stored as `AtomicU8` so that host threads touching overlapping
//! ranges race without undefined behaviour. No ordering between such
//! accesses is promised beyond what WebAssembly's shared memory gives.
//!
//! The buffer sits behind an `RwLock` whose write side is only taken by
//! `grow` once the gate has drained every guard, so it is never contended.
//! This module contains no unsafe code.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use super::fault::TrapPolicy;
use super::gate::{OperationGate, OperationGuard};
use super::RuntimeError;

/// WebAssembly page size in bytes (64KB)
pub const WASM_PAGE_SIZE: u64 = 65536;

/// Bytes addressable by a 32-bit guest (4GB)
pub const WASM32_ADDRESS_SPACE: u64 = 1 << 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Index of this memory within its instance, used in fault reports.
    pub index: usize,
    pub initial_pages: u64,
    /// `None` allows as many pages as a 32-bit guest can address.
    pub max_pages: Option<u64>,
    /// Must be a power of two. The custom-page-sizes proposal allows 1.
    pub page_size: u64,
    pub trap_policy: TrapPolicy,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            index: 0,
            initial_pages: 1,
            max_pages: None,
            page_size: WASM_PAGE_SIZE,
            trap_policy: TrapPolicy::default(),
        }
    }
}

pub struct LinearMemory {
    index: usize,
    gate: OperationGate,
    /// Replaced only by `grow`, which holds the gate exclusively.
    buffer: RwLock<Box<[AtomicU8]>>,
    length: AtomicUsize,
    page_size_log2: u32,
    max_pages: u64,
    pub(crate) trap_policy: TrapPolicy,
}

fn zeroed(len: usize) -> Result<Box<[AtomicU8]>, RuntimeError> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(len)
        .map_err(|_| RuntimeError::MemoryError(format!("cannot allocate {len} bytes of linear memory")))?;
    bytes.resize_with(len, || AtomicU8::new(0));
    Ok(bytes.into_boxed_slice())
}

impl LinearMemory {
    /// Allocate `initial_pages` zeroed pages.
    ///
    /// # Errors
    /// - `page_size` is not a power of two
    /// - `initial_pages` exceeds the maximum
    /// - the initial size does not fit in host memory
    pub fn new(config: MemoryConfig) -> Result<Self, RuntimeError> {
        let MemoryConfig {
            index,
            initial_pages,
            max_pages,
            page_size,
            trap_policy,
        } = config;

        if !page_size.is_power_of_two() {
            return Err(RuntimeError::InvalidPageSize(page_size));
        }
        let page_size_log2 = page_size.trailing_zeros();
        let max_pages = max_pages.unwrap_or(WASM32_ADDRESS_SPACE >> page_size_log2);

        if initial_pages > max_pages {
            return Err(RuntimeError::MemoryError(format!(
                "Initial size {initial_pages} pages exceeds maximum {max_pages} pages"
            )));
        }

        let length = pages_to_bytes(initial_pages, page_size_log2).ok_or_else(|| {
            RuntimeError::MemoryError(format!("{initial_pages} pages do not fit in host memory"))
        })?;

        Ok(LinearMemory {
            index,
            gate: OperationGate::new(),
            buffer: RwLock::new(zeroed(length)?),
            length: AtomicUsize::new(length),
            page_size_log2,
            max_pages,
            trap_policy,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Current length in bytes. Only ever increases.
    pub fn length(&self) -> usize {
        self.length.load(Ordering::SeqCst)
    }

    pub fn pages(&self) -> u64 {
        (self.length() >> self.page_size_log2) as u64
    }

    pub fn max_pages(&self) -> u64 {
        self.max_pages
    }

    pub fn page_size(&self) -> u64 {
        1 << self.page_size_log2
    }

    pub fn gate(&self) -> &OperationGate {
        &self.gate
    }

    /// Register an access. Blocks while a grow is in flight.
    pub fn guard(&self) -> MemoryGuard<'_> {
        let op = self.gate.enter();
        // No writer can be waiting while `op` is live.
        let bytes = self.buffer.read_recursive();
        MemoryGuard {
            memory: self,
            bytes,
            _op: op,
        }
    }

    /// Grow by `delta_pages` and return the previous page count, or `None`
    /// if the result would exceed the maximum or cannot be allocated.
    ///
    /// The contents move to a new allocation; new pages are zeroed. Waits
    /// for live guards to drop, and must not be called while this thread
    /// holds one.
    pub fn grow(&self, delta_pages: u64) -> Option<u64> {
        if delta_pages == 0 {
            return Some(self.pages());
        }

        let _exclusive = self.gate.exclusive();
        let old_pages = self.pages();

        let new_pages = match old_pages.checked_add(delta_pages) {
            Some(pages) if pages <= self.max_pages => pages,
            _ => {
                tracing::warn!(
                    memory_idx = self.index,
                    current_pages = old_pages,
                    delta_pages,
                    max_pages = self.max_pages,
                    "memory growth denied: exceeds limit"
                );
                return None;
            }
        };
        let new_length = pages_to_bytes(new_pages, self.page_size_log2)?;

        // No `MemoryGuard` exists while `_exclusive` is held.
        let mut buffer = self.buffer.write();
        let mut grown = match zeroed(new_length) {
            Ok(grown) => grown,
            Err(error) => {
                tracing::warn!(memory_idx = self.index, %error, "memory growth failed");
                return None;
            }
        };
        for (new, old) in grown.iter_mut().zip(buffer.iter()) {
            *new.get_mut() = old.load(Ordering::Relaxed);
        }
        *buffer = grown;
        self.length.store(new_length, Ordering::SeqCst);

        tracing::debug!(
            memory_idx = self.index,
            from_pages = old_pages,
            to_pages = new_pages,
            "memory grown"
        );
        Some(old_pages)
    }
}

fn pages_to_bytes(pages: u64, page_size_log2: u32) -> Option<usize> {
    let bytes = pages.checked_mul(1 << page_size_log2)?;
    usize::try_from(bytes).ok()
}

impl std::fmt::Debug for LinearMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearMemory")
            .field("index", &self.index)
            .field("length", &self.length())
            .field("page_size", &self.page_size())
            .field("max_pages", &self.max_pages)
            .field("trap_policy", &self.trap_policy)
            .finish()
    }
}

/// A live access to a [`LinearMemory`]. While it exists the buffer cannot
/// move and its length is fixed. The unlocked accessors live on this type.
pub struct MemoryGuard<'m> {
    pub(crate) memory: &'m LinearMemory,
    /// Released before `_op`, so `grow` never finds the lock still held.
    pub(crate) bytes: RwLockReadGuard<'m, Box<[AtomicU8]>>,
    _op: OperationGuard<'m>,
}

impl<'m> MemoryGuard<'m> {
    pub fn memory(&self) -> &'m LinearMemory {
        self.memory
    }

    /// Length in bytes as seen by this guard.
    pub fn length(&self) -> usize {
        self.bytes.len()
    }

    pub fn page_size(&self) -> u64 {
        self.memory.page_size()
    }

    /// Copy the whole memory out. Mostly useful in tests.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }
}

impl std::fmt::Debug for MemoryGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGuard")
            .field("memory_idx", &self.memory.index)
            .field("length", &self.length())
            .finish()
    }
}
