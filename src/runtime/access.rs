//! Bounds-checked access to guest memory for host calls.
//!
//! Every operation comes in four flavours:
//!
//! | | caller holds a [`MemoryGuard`] | takes its own guard |
//! |---|---|---|
//! | checked | `guard.read(..)` | `memory.read(..)` |
//! | unchecked | `guard.read_unchecked(..)` | `memory.read_unchecked(..)` |
//!
//! and is generic over the guest address type: `usize` for host-native
//! offsets, `u32` for wasm32 and `u64` for wasm64 guests. A guest address
//! that does not fit in `usize` traps with [`FaultKind::AddressOverflow`]
//! before anything else is looked at, checked or not.
//!
//! Checked forms trap with [`FaultKind::OutOfBounds`] when the range leaves
//! memory. Unchecked forms are for ranges the caller has already validated;
//! because memory never shrinks, a validation made under an earlier guard
//! still holds. They stay memory-safe, and an out-of-range unchecked access
//! panics as the host bug it is.
//!
//! Scalars are little-endian regardless of the host.

use std::ops::Range;
use std::sync::atomic::Ordering;

use byteorder::{ByteOrder, LittleEndian};

use super::fault::{self, FaultKind, MemoryFault};
use super::memory::{LinearMemory, MemoryGuard};

/// An address as supplied by the guest.
pub trait GuestAddress: Copy {
    /// The address in the host's size type, if it fits.
    fn to_host(self) -> Option<usize>;
    /// The address widened for diagnostics.
    fn to_u64(self) -> u64;
}

impl GuestAddress for usize {
    #[inline]
    fn to_host(self) -> Option<usize> {
        Some(self)
    }

    #[inline]
    fn to_u64(self) -> u64 {
        self as u64
    }
}

impl GuestAddress for u32 {
    #[inline]
    fn to_host(self) -> Option<usize> {
        usize::try_from(self).ok()
    }

    #[inline]
    fn to_u64(self) -> u64 {
        u64::from(self)
    }
}

impl GuestAddress for u64 {
    #[inline]
    fn to_host(self) -> Option<usize> {
        usize::try_from(self).ok()
    }

    #[inline]
    fn to_u64(self) -> u64 {
        self
    }
}

/// A fixed-width integer with a little-endian memory representation.
pub trait WasmScalar: Copy {
    const SIZE: usize;
    fn from_le(bytes: &[u8]) -> Self;
    fn to_le(self, bytes: &mut [u8]);
}

impl WasmScalar for u8 {
    const SIZE: usize = 1;

    fn from_le(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn to_le(self, bytes: &mut [u8]) {
        bytes[0] = self;
    }
}

impl WasmScalar for i8 {
    const SIZE: usize = 1;

    fn from_le(bytes: &[u8]) -> Self {
        bytes[0] as i8
    }

    fn to_le(self, bytes: &mut [u8]) {
        bytes[0] = self as u8;
    }
}

macro_rules! impl_wasm_scalar {
    ($($t:ty => $read:ident, $write:ident);* $(;)?) => {
        $(
            impl WasmScalar for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn from_le(bytes: &[u8]) -> Self {
                    LittleEndian::$read(bytes)
                }

                fn to_le(self, bytes: &mut [u8]) {
                    LittleEndian::$write(bytes, self)
                }
            }
        )*
    };
}

impl_wasm_scalar!(
    u16 => read_u16, write_u16;
    i16 => read_i16, write_i16;
    u32 => read_u32, write_u32;
    i32 => read_i32, write_i32;
    u64 => read_u64, write_u64;
    i64 => read_i64, write_i64;
);

const MAX_SCALAR: usize = 8;

// Core ------------------------------------------------------------------------

impl<'m> MemoryGuard<'m> {
    #[cold]
    fn fault(&self, kind: FaultKind, offset: u64, size: usize) -> ! {
        fault::trap(
            self.memory.trap_policy,
            MemoryFault {
                kind,
                memory_idx: self.memory.index(),
                memory_offset: offset,
                memory_static_offset: 0,
                memory_length: self.bytes.len() as u64,
                memory_type_size: size as u64,
            },
        )
    }

    /// Translate `offset` to the host and, when `CHECKED`, prove that
    /// `[offset, offset + size)` lies inside memory.
    #[inline]
    fn range<A: GuestAddress, const CHECKED: bool>(&self, offset: A, size: usize) -> Range<usize> {
        let start = match offset.to_host() {
            Some(start) => start,
            None => self.fault(FaultKind::AddressOverflow, offset.to_u64(), size),
        };
        if CHECKED {
            self.check(start, size);
        }
        start..start.saturating_add(size)
    }

    /// Compare against the remaining length rather than computing
    /// `offset + size`, which could overflow.
    #[inline]
    fn check(&self, offset: usize, size: usize) {
        let length = self.bytes.len();
        if size > length || offset > length - size {
            self.fault(FaultKind::OutOfBounds, offset as u64, size);
        }
    }

    fn read_impl<A: GuestAddress, const CHECKED: bool>(&self, offset: A, dest: &mut [u8]) {
        let range = self.range::<A, CHECKED>(offset, dest.len());
        for (d, s) in dest.iter_mut().zip(&self.bytes[range]) {
            *d = s.load(Ordering::Relaxed);
        }
    }

    fn write_impl<A: GuestAddress, const CHECKED: bool>(&self, offset: A, src: &[u8]) {
        let range = self.range::<A, CHECKED>(offset, src.len());
        for (d, &s) in self.bytes[range].iter().zip(src) {
            d.store(s, Ordering::Relaxed);
        }
    }

    fn clear_impl<A: GuestAddress, const CHECKED: bool>(&self, offset: A, size: usize) {
        let range = self.range::<A, CHECKED>(offset, size);
        for byte in &self.bytes[range] {
            byte.store(0, Ordering::Relaxed);
        }
    }

    fn get_scalar_impl<V: WasmScalar, A: GuestAddress, const CHECKED: bool>(&self, offset: A) -> V {
        let mut buf = [0u8; MAX_SCALAR];
        self.read_impl::<A, CHECKED>(offset, &mut buf[..V::SIZE]);
        V::from_le(&buf[..V::SIZE])
    }

    fn store_scalar_impl<V: WasmScalar, A: GuestAddress, const CHECKED: bool>(&self, offset: A, value: V) {
        let mut buf = [0u8; MAX_SCALAR];
        value.to_le(&mut buf[..V::SIZE]);
        self.write_impl::<A, CHECKED>(offset, &buf[..V::SIZE]);
    }
}

// Unlocked entry points -------------------------------------------------------

impl<'m> MemoryGuard<'m> {
    /// Trap unless `[offset, offset + size)` lies inside memory.
    pub fn check_bounds<A: GuestAddress>(&self, offset: A, size: usize) {
        self.range::<A, true>(offset, size);
    }

    pub fn read<A: GuestAddress>(&self, offset: A, dest: &mut [u8]) {
        self.read_impl::<A, true>(offset, dest)
    }

    pub fn read_unchecked<A: GuestAddress>(&self, offset: A, dest: &mut [u8]) {
        self.read_impl::<A, false>(offset, dest)
    }

    pub fn write<A: GuestAddress>(&self, offset: A, src: &[u8]) {
        self.write_impl::<A, true>(offset, src)
    }

    pub fn write_unchecked<A: GuestAddress>(&self, offset: A, src: &[u8]) {
        self.write_impl::<A, false>(offset, src)
    }

    /// Zero `size` bytes at `offset`.
    pub fn clear<A: GuestAddress>(&self, offset: A, size: usize) {
        self.clear_impl::<A, true>(offset, size)
    }

    pub fn clear_unchecked<A: GuestAddress>(&self, offset: A, size: usize) {
        self.clear_impl::<A, false>(offset, size)
    }

    pub fn get_scalar<V: WasmScalar, A: GuestAddress>(&self, offset: A) -> V {
        self.get_scalar_impl::<V, A, true>(offset)
    }

    pub fn get_scalar_unchecked<V: WasmScalar, A: GuestAddress>(&self, offset: A) -> V {
        self.get_scalar_impl::<V, A, false>(offset)
    }

    pub fn store_scalar<V: WasmScalar, A: GuestAddress>(&self, offset: A, value: V) {
        self.store_scalar_impl::<V, A, true>(offset, value)
    }

    pub fn store_scalar_unchecked<V: WasmScalar, A: GuestAddress>(&self, offset: A, value: V) {
        self.store_scalar_impl::<V, A, false>(offset, value)
    }
}

// Locked entry points ---------------------------------------------------------

/// Each method takes a guard for the duration of the call and forwards to
/// the [`MemoryGuard`] method of the same name.
macro_rules! locked {
    ($(
        $(#[$meta:meta])*
        fn $name:ident<$($g:ident: $bound:ident),*>($($arg:ident: $ty:ty),*) $(-> $ret:ty)?;
    )*) => {
        impl LinearMemory {
            $(
                $(#[$meta])*
                pub fn $name<$($g: $bound),*>(&self, $($arg: $ty),*) $(-> $ret)? {
                    self.guard().$name::<$($g),*>($($arg),*)
                }
            )*
        }
    };
}

locked! {
    /// Trap unless `[offset, offset + size)` lies inside memory.
    fn check_bounds<A: GuestAddress>(offset: A, size: usize);
    fn read<A: GuestAddress>(offset: A, dest: &mut [u8]);
    fn read_unchecked<A: GuestAddress>(offset: A, dest: &mut [u8]);
    fn write<A: GuestAddress>(offset: A, src: &[u8]);
    fn write_unchecked<A: GuestAddress>(offset: A, src: &[u8]);
    /// Zero `size` bytes at `offset`.
    fn clear<A: GuestAddress>(offset: A, size: usize);
    fn clear_unchecked<A: GuestAddress>(offset: A, size: usize);
    fn get_scalar<V: WasmScalar, A: GuestAddress>(offset: A) -> V;
    fn get_scalar_unchecked<V: WasmScalar, A: GuestAddress>(offset: A) -> V;
    fn store_scalar<V: WasmScalar, A: GuestAddress>(offset: A, value: V);
    fn store_scalar_unchecked<V: WasmScalar, A: GuestAddress>(offset: A, value: V);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fault::TrapPolicy;
    use crate::runtime::memory::MemoryConfig;
    use std::panic::{self, AssertUnwindSafe};

    fn memory(length: u64) -> LinearMemory {
        LinearMemory::new(MemoryConfig {
            page_size: 1,
            initial_pages: length,
            trap_policy: TrapPolicy::Unwind,
            ..MemoryConfig::default()
        })
        .unwrap()
    }

    fn fault_of(f: impl FnOnce()) -> Option<MemoryFault> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(()) => None,
            Err(payload) => payload.downcast_ref::<MemoryFault>().copied(),
        }
    }

    #[test]
    fn test_check_bounds_edges() {
        let mem = memory(10);
        assert_eq!(fault_of(|| mem.check_bounds(6usize, 4)), None);
        assert_eq!(fault_of(|| mem.check_bounds(10usize, 0)), None);

        let fault = fault_of(|| mem.check_bounds(8usize, 4)).unwrap();
        assert_eq!(fault.kind, FaultKind::OutOfBounds);
        assert_eq!(fault.memory_offset, 8);
        assert_eq!(fault.memory_length, 10);
        assert_eq!(fault.memory_type_size, 4);

        assert!(fault_of(|| mem.check_bounds(0usize, 11)).is_some());
        assert!(fault_of(|| mem.check_bounds(usize::MAX, 1)).is_some());
        assert!(fault_of(|| mem.check_bounds(1usize, usize::MAX)).is_some());
    }

    #[test]
    fn test_scalars_are_little_endian() {
        let mem = memory(16);
        mem.store_scalar(0u32, 0x0102_0304u32);
        let mut raw = [0u8; 4];
        mem.read(0u32, &mut raw);
        assert_eq!(raw, [0x04, 0x03, 0x02, 0x01]);

        mem.store_scalar(8u64, -2i64);
        assert_eq!(mem.get_scalar::<u64, _>(8u64), u64::MAX - 1);
        assert_eq!(mem.get_scalar::<i8, _>(15usize), -1);
    }

    #[test]
    fn test_clear() {
        let mem = memory(8);
        mem.write(0usize, &[0xFF; 8]);
        mem.clear(2usize, 4);
        assert_eq!(mem.guard().snapshot(), vec![0xFF, 0xFF, 0, 0, 0, 0, 0xFF, 0xFF]);
    }

    #[test]
    fn test_unchecked_still_panics_out_of_range() {
        let mem = memory(4);
        let result = panic::catch_unwind(AssertUnwindSafe(|| mem.get_scalar_unchecked::<u32, _>(2usize)));
        let payload = result.unwrap_err();
        assert!(payload.downcast_ref::<MemoryFault>().is_none());
    }

    #[test]
    fn test_guard_reuse_for_many_accesses() {
        let mem = memory(32);
        let guard = mem.guard();
        guard.check_bounds(0u32, 32);
        for i in 0..8u32 {
            guard.store_scalar_unchecked(i * 4, i);
        }
        let sum: u32 = (0..8u32).map(|i| guard.get_scalar_unchecked::<u32, _>(i * 4)).sum();
        assert_eq!(sum, 28);
        assert_eq!(mem.gate().active_ops(), 1);
    }

    /// An address too wide for any host.
    #[derive(Clone, Copy)]
    struct Unaddressable;

    impl GuestAddress for Unaddressable {
        fn to_host(self) -> Option<usize> {
            None
        }

        fn to_u64(self) -> u64 {
            u64::MAX
        }
    }

    fn case<'a>(name: &'static str, access: impl FnOnce() + 'a) -> (&'static str, Box<dyn FnOnce() + 'a>) {
        (name, Box::new(access))
    }

    #[test]
    fn test_address_overflow_traps_before_bounds_check() {
        // Every range below is also out of bounds for a 4-byte memory.
        let mem = memory(4);
        let at = Unaddressable;

        let accesses = vec![
            case("check_bounds", || mem.check_bounds(at, 8)),
            case("read", || mem.read(at, &mut [0u8; 8])),
            case("read_unchecked", || mem.read_unchecked(at, &mut [0u8; 8])),
            case("write", || mem.write(at, &[1; 8])),
            case("write_unchecked", || mem.write_unchecked(at, &[1; 8])),
            case("clear", || mem.clear(at, 8)),
            case("clear_unchecked", || mem.clear_unchecked(at, 8)),
            case("get_scalar", || {
                let _ = mem.get_scalar::<u64, _>(at);
            }),
            case("get_scalar_unchecked", || {
                let _ = mem.get_scalar_unchecked::<u64, _>(at);
            }),
            case("store_scalar", || mem.store_scalar(at, 1u64)),
            case("store_scalar_unchecked", || mem.store_scalar_unchecked(at, 1u64)),
            case("guard.check_bounds", || mem.guard().check_bounds(at, 8)),
            case("guard.read", || mem.guard().read(at, &mut [0u8; 8])),
            case("guard.read_unchecked", || mem.guard().read_unchecked(at, &mut [0u8; 8])),
            case("guard.write", || mem.guard().write(at, &[1; 8])),
            case("guard.write_unchecked", || mem.guard().write_unchecked(at, &[1; 8])),
            case("guard.clear_unchecked", || mem.guard().clear_unchecked(at, 8)),
            case("guard.get_scalar_unchecked", || {
                let _ = mem.guard().get_scalar_unchecked::<u64, _>(at);
            }),
            case("guard.store_scalar_unchecked", || mem.guard().store_scalar_unchecked(at, 1u64)),
        ];

        for (name, access) in accesses {
            let fault = fault_of(access).unwrap_or_else(|| panic!("{name} did not trap"));
            assert_eq!(fault.kind, FaultKind::AddressOverflow, "{name}");
            assert_eq!(fault.memory_offset, u64::MAX, "{name}");
            assert_eq!(fault.memory_type_size, 8, "{name}");
        }
        assert_eq!(mem.gate().active_ops(), 0);
        assert_eq!(mem.guard().snapshot(), vec![0; 4]);
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn test_w64_address_overflow_precedes_bounds_check() {
        let mem = memory(16);
        let fault = fault_of(|| {
            mem.get_scalar::<u32, _>(1u64 << 40);
        })
        .unwrap();
        assert_eq!(fault.kind, FaultKind::AddressOverflow);
        assert_eq!(fault.memory_offset, 1 << 40);

        let fault = fault_of(|| {
            mem.get_scalar_unchecked::<u32, _>(1u64 << 40);
        })
        .unwrap();
        assert_eq!(fault.kind, FaultKind::AddressOverflow);
    }
}
