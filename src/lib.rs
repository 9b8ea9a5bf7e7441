//! Host-side safety plumbing for WebAssembly runtimes.
//!
//! wasm-boundary holds the pieces of a runtime that sit on the trust boundary
//! between host and guest: accessing a guest's linear memory from host code
//! while other threads may grow it, decoding the untrusted `name` custom
//! section, and validating the UTF-8 that guests hand to the host.
//!
//! # Modules
//!
//! - [`runtime`] -- Linear memory, the grow/access rendezvous, bounds-checked accessors, and WASI host calls built on them.
//! - [`parser`] -- Module header and section framing, LEB128 reading, and the `name` section decoder.
//! - [`utf8`] -- UTF-8 validation with scalar, word-at-a-time, and vector implementations.
//! - [`config`] -- JSON configuration for all of the above.
//!
//! # Example
//!
//! Decode the names of a module and read them back from guest memory:
//!
//! ```
//! use wasm_boundary::parser::{self, names::NameDecoder};
//! use wasm_boundary::runtime::{LinearMemory, MemoryConfig};
//!
//! let module = [
//!     0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
//!     0x00, 0x0d, 0x04, b'n', b'a', b'm', b'e',       // custom section "name"
//!     0x00, 0x06, 0x05, b'h', b'e', b'l', b'l', b'o', // module name "hello"
//! ];
//! let names = parser::parse_names(&module, &NameDecoder::default()).unwrap();
//! assert_eq!(names.names.module_name.as_deref(), Some("hello"));
//! assert!(names.diagnostics.is_empty());
//!
//! let memory = LinearMemory::new(MemoryConfig::default()).unwrap();
//! memory.write(16u32, b"hello");
//! memory.store_scalar(32u32, 5u32);
//! assert_eq!(memory.get_scalar::<u32, _>(32u32), 5);
//! ```
//!
//! # Specification
//!
//! Follows the [WebAssembly 2.0 specification](https://webassembly.github.io/spec/core/)
//! for binary framing and the name section, and [RFC 3629](https://www.rfc-editor.org/rfc/rfc3629)
//! for UTF-8.

pub mod config;
pub mod parser;
pub mod runtime;
pub mod utf8;
