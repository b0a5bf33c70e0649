//! Fuzz target for repository id validation.
//!
//! Tests that the validator handles arbitrary input without panicking and
//! never accepts separators or traversal sequences.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if berth_gateway::validate_repo_id(s).is_ok() {
            assert!(!s.contains('/'));
            assert!(!s.contains('\\'));
            assert!(!s.contains(".."));
            assert!(!s.is_empty());
        }
    }

    let lossy = String::from_utf8_lossy(data);
    let _ = berth_gateway::validate_repo_id(&lossy);
});
