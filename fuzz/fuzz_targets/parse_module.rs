#![no_main]

use libfuzzer_sys::fuzz_target;

use wasm_boundary::parser::{self, names::NameDecoder};

fuzz_target!(|data: &[u8]| {
    // Errors are fine; we're looking for panics/crashes
    let _ = parser::parse_names(data, &NameDecoder::default());
});
