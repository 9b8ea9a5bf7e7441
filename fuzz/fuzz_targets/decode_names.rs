#![no_main]

use libfuzzer_sys::fuzz_target;

use wasm_boundary::parser::names::{self, NameTable};

fuzz_target!(|data: &[u8]| {
    let mut table = NameTable::default();
    let errors = names::decode(&mut table, data);
    for error in &errors {
        assert!(error.offset <= data.len());
    }
    for name in table.function_names.values().chain(table.type_names.values()) {
        assert!(!name.is_empty() && !name.contains('\0'));
    }
});
