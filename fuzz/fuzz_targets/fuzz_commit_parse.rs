//! Fuzz target for git commit object parsing.
//!
//! Tests that the commit text decoder handles arbitrary input without panicking.

#![no_main]

use berth_storage::Commit;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(commit) = Commit::parse(data) {
        // Accepted commits must survive a serialize/parse cycle.
        let _ = Commit::parse(&commit.serialize()).unwrap();
    }
});
