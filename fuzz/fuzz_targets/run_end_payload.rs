#![no_main]

use libfuzzer_sys::fuzz_target;
use qutest_core::{RunEnd, is_valid_binding_name};

fuzz_target!(|data: &[u8]| {
    // Payloads arrive as strings from the page; anything else cannot reach the parser
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(run_end) = RunEnd::from_payload(s) {
            // Accessors must hold up on any decodable payload
            let _ = run_end.passed();
            for test in run_end.failed_tests() {
                let _ = test.display_name();
            }
        }
        let _ = is_valid_binding_name(s);
    }
});
