#![no_main]

use libfuzzer_sys::fuzz_target;

use wasm_boundary::utf8::{self, Strategy, Utf8Policy};

fuzz_target!(|data: &[u8]| {
    let std_ok = std::str::from_utf8(data).is_ok();

    for policy in [Utf8Policy::Rfc3629, Utf8Policy::Rfc3629ZeroIllegal] {
        let expected = utf8::validate_with(Strategy::Scalar, policy, data);
        let accepted = std_ok && !(policy.zero_illegal() && data.contains(&0));
        assert_eq!(expected.is_ok(), accepted);

        for strategy in [Strategy::Swar, Strategy::Vector] {
            assert_eq!(utf8::validate_with(strategy, policy, data), expected);
        }
    }
});
