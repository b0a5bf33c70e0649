//! Fuzz target for git tree object parsing.
//!
//! Tests that the binary tree decoder handles arbitrary input without panicking,
//! and that anything it accepts re-serializes to a parseable tree.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(entries) = berth_storage::tree::parse(data) {
        let bytes = berth_storage::tree::serialize(&entries);
        // Canonical output must always be parseable.
        let _ = berth_storage::tree::parse(&bytes).unwrap();
    }
});
