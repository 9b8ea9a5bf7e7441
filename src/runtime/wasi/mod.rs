//! WASI preview1 host calls that move data through guest memory.
//!
//! Only the calls a command-line guest needs to talk to the host are
//! provided: `fd_read`, `fd_write` and the argument pair. They are
//! consumers of [`crate::runtime::access`] and show the intended split:
//! validate guest pointers, answer bad ones with an errno, then copy with
//! the unchecked accessors under one guard.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wasm_boundary::runtime::{LinearMemory, MemoryConfig};
//! use wasm_boundary::runtime::wasi::WasiContext;
//!
//! let memory = Arc::new(LinearMemory::new(MemoryConfig::default()).unwrap());
//! let wasi = WasiContext::builder().args(["guest"]).build();
//! wasi.bind_memory(memory);
//!
//! wasi.args_sizes_get(0, 4).unwrap();
//! assert_eq!(wasi.read_u32(0), Ok(1));
//! ```

mod context;
mod types;

pub use context::{FileDescriptor, WasiContext, WasiContextBuilder, IOVEC_SIZE};
pub use types::{errno_of, WasiErrno};
