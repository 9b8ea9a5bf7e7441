//! Common test utilities shared between integration tests
#![allow(dead_code)]

use std::io::Write;
use std::sync::{Arc, Mutex};

use wasm_boundary::parser::reader::write_vu32;

/// Captured writer that stores output for testing
pub struct CapturedWriter(pub Arc<Mutex<Vec<u8>>>);

impl Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub const HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

pub fn leb(value: u32) -> Vec<u8> {
    let mut out = Vec::new();
    write_vu32(&mut out, value);
    out
}

/// `len:u32 bytes`
pub fn name(bytes: &[u8]) -> Vec<u8> {
    let mut out = leb(bytes.len() as u32);
    out.extend_from_slice(bytes);
    out
}

/// `id:u8 size:u32 payload`
pub fn section(id: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![id];
    out.extend(leb(payload.len() as u32));
    out.extend_from_slice(payload);
    out
}

/// A name map: `count (index name)*`.
pub fn name_map(entries: &[(u32, &str)]) -> Vec<u8> {
    let mut out = leb(entries.len() as u32);
    for (index, entry) in entries {
        out.extend(leb(*index));
        out.extend(name(entry.as_bytes()));
    }
    out
}

/// An indirect name map: `count (index name_map)*`.
pub fn indirect_name_map(entries: &[(u32, &[(u32, &str)])]) -> Vec<u8> {
    let mut out = leb(entries.len() as u32);
    for (index, map) in entries {
        out.extend(leb(*index));
        out.extend(name_map(map));
    }
    out
}

/// A module holding one custom section per `(name, payload)` pair.
pub fn module_with_custom(sections: &[(&[u8], &[u8])]) -> Vec<u8> {
    let mut out = HEADER.to_vec();
    for (section_name, payload) in sections {
        let mut body = name(section_name);
        body.extend_from_slice(payload);
        out.extend(section(0, &body));
    }
    out
}

/// A module whose only section is a `name` section built from subsections.
pub fn module_with_names(subsections: &[Vec<u8>]) -> Vec<u8> {
    let payload: Vec<u8> = subsections.concat();
    module_with_custom(&[(&b"name"[..], &payload[..])])
}

/// Custom section names the WebAssembly test suite rejects as malformed
/// UTF-8: stray continuation bytes, truncated and overlong sequences,
/// surrogates, code points past U+10FFFF and the bytes 0xF8 to 0xFF.
pub const MALFORMED_NAMES: &[&[u8]] = &[
    b"\x80", b"\x8F", b"\x90", b"\x9F",
    b"\xA0", b"\xBF", b"\xC2\x80\x80", b"\xC2",
    b"\xC2\x2E", b"\xC0\x80", b"\xC0\xBF", b"\xC1\x80",
    b"\xC1\xBF", b"\xC2\x00", b"\xC2\x7F", b"\xC2\xC0",
    b"\xC2\xFD", b"\xDF\x00", b"\xDF\x7F", b"\xDF\xC0",
    b"\xDF\xFD", b"\xE1\x80\x80\x80", b"\xE1\x80", b"\xE1\x80\x2E",
    b"\xE1", b"\xE1\x2E", b"\xE0\x00\xA0", b"\xE0\x7F\xA0",
    b"\xE0\x80\x80", b"\xE0\x80\xA0", b"\xE0\x9F\xA0", b"\xE0\x9F\xBF",
    b"\xE0\xC0\xA0", b"\xE0\xFD\xA0", b"\xE1\x00\x80", b"\xE1\x7F\x80",
    b"\xE1\xC0\x80", b"\xE1\xFD\x80", b"\xEC\x00\x80", b"\xEC\x7F\x80",
    b"\xEC\xC0\x80", b"\xEC\xFD\x80", b"\xED\x00\x80", b"\xED\x7F\x80",
    b"\xED\xA0\x80", b"\xED\xA0\xBF", b"\xED\xBF\x80", b"\xED\xBF\xBF",
    b"\xED\xC0\x80", b"\xED\xFD\x80", b"\xEE\x00\x80", b"\xEE\x7F\x80",
    b"\xEE\xC0\x80", b"\xEE\xFD\x80", b"\xEF\x00\x80", b"\xEF\x7F\x80",
    b"\xEF\xC0\x80", b"\xEF\xFD\x80", b"\xE0\xA0\x00", b"\xE0\xA0\x7F",
    b"\xE0\xA0\xC0", b"\xE0\xA0\xFD", b"\xE1\x80\x00", b"\xE1\x80\x7F",
    b"\xE1\x80\xC0", b"\xE1\x80\xFD", b"\xEC\x80\x00", b"\xEC\x80\x7F",
    b"\xEC\x80\xC0", b"\xEC\x80\xFD", b"\xED\x80\x00", b"\xED\x80\x7F",
    b"\xED\x80\xC0", b"\xED\x80\xFD", b"\xEE\x80\x00", b"\xEE\x80\x7F",
    b"\xEE\x80\xC0", b"\xEE\x80\xFD", b"\xEF\x80\x00", b"\xEF\x80\x7F",
    b"\xEF\x80\xC0", b"\xEF\x80\xFD", b"\xF1\x80\x80\x80\x80", b"\xF1\x80\x80",
    b"\xF1\x80\x80\x23", b"\xF1\x80", b"\xF1\x80\x23", b"\xF1",
    b"\xF1\x23", b"\xF0\x00\x90\x90", b"\xF0\x7F\x90\x90", b"\xF0\x80\x80\x80",
    b"\xF0\x80\x90\x90", b"\xF0\x8F\x90\x90", b"\xF0\x8F\xBF\xBF", b"\xF0\xC0\x90\x90",
    b"\xF0\xFD\x90\x90", b"\xF1\x00\x80\x80", b"\xF1\x7F\x80\x80", b"\xF1\xC0\x80\x80",
    b"\xF1\xFD\x80\x80", b"\xF3\x00\x80\x80", b"\xF3\x7F\x80\x80", b"\xF3\xC0\x80\x80",
    b"\xF3\xFD\x80\x80", b"\xF4\x00\x80\x80", b"\xF4\x7F\x80\x80", b"\xF4\x90\x80\x80",
    b"\xF4\xBF\x80\x80", b"\xF4\xC0\x80\x80", b"\xF4\xFD\x80\x80", b"\xF5\x80\x80\x80",
    b"\xF7\x80\x80\x80", b"\xF7\xBF\xBF\xBF", b"\xF0\x90\x00\x90", b"\xF0\x90\x7F\x90",
    b"\xF0\x90\xC0\x90", b"\xF0\x90\xFD\x90", b"\xF1\x80\x00\x80", b"\xF1\x80\x7F\x80",
    b"\xF1\x80\xC0\x80", b"\xF1\x80\xFD\x80", b"\xF3\x80\x00\x80", b"\xF3\x80\x7F\x80",
    b"\xF3\x80\xC0\x80", b"\xF3\x80\xFD\x80", b"\xF4\x80\x00\x80", b"\xF4\x80\x7F\x80",
    b"\xF4\x80\xC0\x80", b"\xF4\x80\xFD\x80", b"\xF0\x90\x90\x00", b"\xF0\x90\x90\x7F",
    b"\xF0\x90\x90\xC0", b"\xF0\x90\x90\xFD", b"\xF1\x80\x80\x00", b"\xF1\x80\x80\x7F",
    b"\xF1\x80\x80\xC0", b"\xF1\x80\x80\xFD", b"\xF3\x80\x80\x00", b"\xF3\x80\x80\x7F",
    b"\xF3\x80\x80\xC0", b"\xF3\x80\x80\xFD", b"\xF4\x80\x80\x00", b"\xF4\x80\x80\x7F",
    b"\xF4\x80\x80\xC0", b"\xF4\x80\x80\xFD", b"\xF8\x80\x80\x80\x80\x80", b"\xF8\x80\x80\x80",
    b"\xF8\x80\x80\x80\x23", b"\xF8\x80\x80", b"\xF8\x80\x80\x23", b"\xF8\x80",
    b"\xF8\x80\x23", b"\xF8", b"\xF8\x23", b"\xF8\x80\x80\x80\x80",
    b"\xFB\xBF\xBF\xBF\xBF", b"\xFC\x80\x80\x80\x80\x80\x80", b"\xFC\x80\x80\x80\x80", b"\xFC\x80\x80\x80\x80\x23",
    b"\xFC\x80\x80\x80", b"\xFC\x80\x80\x80\x23", b"\xFC\x80\x80", b"\xFC\x80\x80\x23",
    b"\xFC\x80", b"\xFC\x80\x23", b"\xFC", b"\xFC\x23",
    b"\xFC\x80\x80\x80\x80\x80", b"\xFD\xBF\xBF\xBF\xBF\xBF", b"\xFE", b"\xFF",
    b"\xFE\xFF", b"\x00\x00\xFE\xFF", b"\xFF\xFE", b"\xFF\xFE\x00\x00",
];
