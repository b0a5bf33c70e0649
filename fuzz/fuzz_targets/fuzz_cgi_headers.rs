//! Fuzz target for CGI response framing.
//!
//! Tests that terminator search and header parsing handle arbitrary
//! subprocess output without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Some(offset) = berth_gateway::find_terminator(data) {
        assert!(offset <= data.len());
        let _ = berth_gateway::parse_headers(&data[..offset]);
    }
    let _ = berth_gateway::parse_headers(data);
});
