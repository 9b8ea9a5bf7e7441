//! WASI context for managing WASI state
//!
//! This module provides the `WasiContext` which holds the memory binding,
//! standard file descriptors and arguments, and implements the host calls
//! that move bytes between them and guest memory.
//!
//! Guest pointers are compared against the memory length before anything is
//! touched; a bad pointer is answered with [`WasiErrno::Fault`]. The actual
//! copies then use the unchecked accessors, so the accessor's fatal trap is
//! reserved for host bugs.
//!
//! No guard is held across host I/O. `fd_read` and `fd_write` validate the
//! iovecs under one short guard, talk to the host stream with none, and copy
//! through fresh guards afterwards. Memory only grows, so the earlier
//! validation still covers those copies even if a grow ran in between.

use super::types::WasiErrno;
use crate::runtime::{LinearMemory, MemoryGuard};
use crate::utf8::{self, Utf8Policy};
use parking_lot::{Mutex, RwLock};
use std::io::{Read, Write};
use std::sync::Arc;

/// Size of a WASI `iovec`/`ciovec`: 4-byte pointer + 4-byte length.
pub const IOVEC_SIZE: u32 = 8;

/// A file descriptor entry for WASI
pub struct FileDescriptor {
    reader: Option<Box<dyn Read + Send>>,
    writer: Option<Box<dyn Write + Send>>,
}

impl FileDescriptor {
    pub fn new_reader(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader: Some(reader),
            writer: None,
        }
    }

    pub fn new_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            reader: None,
            writer: Some(writer),
        }
    }

    pub fn readable(&self) -> bool {
        self.reader.is_some()
    }

    pub fn writable(&self) -> bool {
        self.writer.is_some()
    }
}

impl std::fmt::Debug for FileDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDescriptor")
            .field("readable", &self.readable())
            .field("writable", &self.writable())
            .finish()
    }
}

/// Confirm `[ptr, ptr + len)` lies inside the memory seen by `guard`.
fn guest_range(guard: &MemoryGuard<'_>, ptr: u32, len: usize) -> Result<usize, WasiErrno> {
    let start = usize::try_from(ptr).map_err(|_| WasiErrno::Fault)?;
    let end = start.checked_add(len).ok_or(WasiErrno::Fault)?;
    if end > guard.length() {
        return Err(WasiErrno::Fault);
    }
    Ok(start)
}

/// Read an iovec array. Each entry is `{buf: u32, buf_len: u32}`.
///
/// See: <https://github.com/WebAssembly/WASI/blob/wasi-0.1/preview1/docs.md#iovec>
fn read_iovecs(guard: &MemoryGuard<'_>, ptr: u32, len: u32) -> Result<Vec<(u32, u32)>, WasiErrno> {
    let size = len.checked_mul(IOVEC_SIZE).ok_or(WasiErrno::Overflow)?;
    guest_range(guard, ptr, size as usize)?;

    let mut iovecs = Vec::with_capacity(len as usize);
    for i in 0..len {
        let base = ptr + i * IOVEC_SIZE;
        let buf_ptr = guard.get_scalar_unchecked::<u32, _>(base);
        let buf_len = guard.get_scalar_unchecked::<u32, _>(base + 4);
        guest_range(guard, buf_ptr, buf_len as usize)?;
        iovecs.push((buf_ptr, buf_len));
    }
    Ok(iovecs)
}

/// WASI context holding all WASI-related state
///
/// The context is shared between host calls via `Arc<WasiContext>` and may
/// be used from several threads. Memory is bound after instantiation.
pub struct WasiContext {
    memory: RwLock<Option<Arc<LinearMemory>>>,
    /// File descriptors (0=stdin, 1=stdout, 2=stderr)
    fds: Mutex<Vec<Option<FileDescriptor>>>,
    args: Vec<String>,
}

impl WasiContext {
    pub fn builder() -> WasiContextBuilder {
        WasiContextBuilder::new()
    }

    /// Bind the linear memory to this context
    pub fn bind_memory(&self, memory: Arc<LinearMemory>) {
        *self.memory.write() = Some(memory);
    }

    pub fn has_memory(&self) -> bool {
        self.memory.read().is_some()
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn memory(&self) -> Result<Arc<LinearMemory>, WasiErrno> {
        self.memory.read().clone().ok_or(WasiErrno::Fault)
    }

    // === Memory helper methods ===

    pub fn read_u32(&self, addr: u32) -> Result<u32, WasiErrno> {
        let memory = self.memory()?;
        let guard = memory.guard();
        guest_range(&guard, addr, 4)?;
        Ok(guard.get_scalar_unchecked(addr))
    }

    pub fn write_u32(&self, addr: u32, value: u32) -> Result<(), WasiErrno> {
        let memory = self.memory()?;
        let guard = memory.guard();
        guest_range(&guard, addr, 4)?;
        guard.store_scalar_unchecked(addr, value);
        Ok(())
    }

    pub fn read_bytes(&self, addr: u32, len: usize) -> Result<Vec<u8>, WasiErrno> {
        let memory = self.memory()?;
        let guard = memory.guard();
        guest_range(&guard, addr, len)?;
        let mut bytes = vec![0u8; len];
        guard.read_unchecked(addr, &mut bytes);
        Ok(bytes)
    }

    pub fn write_bytes(&self, addr: u32, bytes: &[u8]) -> Result<(), WasiErrno> {
        let memory = self.memory()?;
        let guard = memory.guard();
        guest_range(&guard, addr, bytes.len())?;
        guard.write_unchecked(addr, bytes);
        Ok(())
    }

    /// Copy a guest string out of memory and certify it as UTF-8.
    pub fn read_guest_string(&self, addr: u32, len: u32) -> Result<String, WasiErrno> {
        let bytes = self.read_bytes(addr, len as usize)?;
        utf8::validate(Utf8Policy::Rfc3629, &bytes).map_err(|error| {
            tracing::debug!(addr, len, %error, "guest string rejected");
            WasiErrno::Ilseq
        })?;
        String::from_utf8(bytes).map_err(|_| WasiErrno::Ilseq)
    }

    // === File descriptor methods ===

    /// Read from a file descriptor into the buffers described by an iovec
    /// array. Returns the number of bytes read.
    pub fn fd_read(&self, fd: u32, iovs_ptr: u32, iovs_len: u32) -> Result<u32, WasiErrno> {
        let memory = self.memory()?;
        let mut fds = self.fds.lock();
        let reader = fds
            .get_mut(fd as usize)
            .and_then(Option::as_mut)
            .and_then(|entry| entry.reader.as_mut())
            .ok_or(WasiErrno::BadF)?;

        let iovecs = read_iovecs(&memory.guard(), iovs_ptr, iovs_len)?;

        let mut total_read: u32 = 0;
        for (buf_ptr, buf_len) in iovecs {
            if buf_len == 0 {
                continue;
            }

            let mut temp_buf = vec![0u8; buf_len as usize];
            let n = loop {
                match reader.read(&mut temp_buf) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => return Err(WasiErrno::Io),
                }
            };
            if n == 0 {
                break; // EOF
            }

            memory.write_unchecked(buf_ptr, &temp_buf[..n]);
            total_read = total_read.checked_add(n as u32).ok_or(WasiErrno::Overflow)?;
            if n < buf_len as usize {
                break; // Partial read, stop here
            }
        }

        Ok(total_read)
    }

    /// Write the buffers described by an iovec array to a file descriptor.
    /// Returns the number of bytes written.
    pub fn fd_write(&self, fd: u32, iovs_ptr: u32, iovs_len: u32) -> Result<u32, WasiErrno> {
        let memory = self.memory()?;
        let mut fds = self.fds.lock();
        let writer = fds
            .get_mut(fd as usize)
            .and_then(Option::as_mut)
            .and_then(|entry| entry.writer.as_mut())
            .ok_or(WasiErrno::BadF)?;

        let iovecs = read_iovecs(&memory.guard(), iovs_ptr, iovs_len)?;

        let mut total_written: u32 = 0;
        for (buf_ptr, buf_len) in iovecs {
            if buf_len == 0 {
                continue;
            }

            let mut data = vec![0u8; buf_len as usize];
            memory.read_unchecked(buf_ptr, &mut data);

            let n = loop {
                match writer.write(&data) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => return Err(WasiErrno::Io),
                }
            };
            total_written = total_written.checked_add(n as u32).ok_or(WasiErrno::Overflow)?;
            if n < buf_len as usize {
                break; // Partial write, stop here
            }
        }

        if let Err(error) = writer.flush() {
            tracing::warn!(fd, total_written, %error, "flush failed after write");
            return Err(WasiErrno::Io);
        }
        Ok(total_written)
    }

    /// Store the argument count and the total size of the NUL-terminated
    /// argument strings.
    pub fn args_sizes_get(&self, argc_ptr: u32, argv_buf_size_ptr: u32) -> Result<(), WasiErrno> {
        let argc = u32::try_from(self.args.len()).map_err(|_| WasiErrno::Overflow)?;
        let buf_size: usize = self.args.iter().map(|arg| arg.len() + 1).sum();
        let buf_size = u32::try_from(buf_size).map_err(|_| WasiErrno::Overflow)?;

        let memory = self.memory()?;
        let guard = memory.guard();
        guest_range(&guard, argc_ptr, 4)?;
        guest_range(&guard, argv_buf_size_ptr, 4)?;
        guard.store_scalar_unchecked(argc_ptr, argc);
        guard.store_scalar_unchecked(argv_buf_size_ptr, buf_size);
        Ok(())
    }

    /// Store a pointer per argument at `argv_ptr` and the NUL-terminated
    /// strings themselves at `argv_buf_ptr`.
    pub fn args_get(&self, argv_ptr: u32, argv_buf_ptr: u32) -> Result<(), WasiErrno> {
        let memory = self.memory()?;
        let guard = memory.guard();

        let pointers = self.args.len().checked_mul(4).ok_or(WasiErrno::Overflow)?;
        guest_range(&guard, argv_ptr, pointers)?;
        let strings: usize = self.args.iter().map(|arg| arg.len() + 1).sum();
        guest_range(&guard, argv_buf_ptr, strings)?;

        let mut cursor = argv_buf_ptr;
        for (i, arg) in self.args.iter().enumerate() {
            guard.store_scalar_unchecked(argv_ptr + (i as u32) * 4, cursor);
            guard.write_unchecked(cursor, arg.as_bytes());
            guard.clear_unchecked(cursor + arg.len() as u32, 1);
            cursor += arg.len() as u32 + 1;
        }
        Ok(())
    }
}

impl std::fmt::Debug for WasiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasiContext")
            .field("has_memory", &self.has_memory())
            .field("args", &self.args)
            .finish()
    }
}

/// Builder for WasiContext
#[derive(Default)]
pub struct WasiContextBuilder {
    args: Vec<String>,
    stdin: Option<Box<dyn Read + Send>>,
    stdout: Option<Box<dyn Write + Send>>,
    stderr: Option<Box<dyn Write + Send>>,
}

impl WasiContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|s| s.into()).collect();
        self
    }

    pub fn stdin(mut self, stdin: Box<dyn Read + Send>) -> Self {
        self.stdin = Some(stdin);
        self
    }

    pub fn stdout(mut self, stdout: Box<dyn Write + Send>) -> Self {
        self.stdout = Some(stdout);
        self
    }

    pub fn stderr(mut self, stderr: Box<dyn Write + Send>) -> Self {
        self.stderr = Some(stderr);
        self
    }

    pub fn build(self) -> WasiContext {
        let fds: Vec<Option<FileDescriptor>> = vec![
            self.stdin.map(FileDescriptor::new_reader),
            self.stdout.map(FileDescriptor::new_writer),
            self.stderr.map(FileDescriptor::new_writer),
        ];

        WasiContext {
            memory: RwLock::new(None),
            fds: Mutex::new(fds),
            args: self.args,
        }
    }
}
