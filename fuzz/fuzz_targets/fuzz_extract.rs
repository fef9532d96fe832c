#![no_main]

use libfuzzer_sys::fuzz_target;

use domain::net::extract::extract_ip_nets;
use domain::net::parse_ip_net;

// Fuzz the free-text address extractor.
//
// Two guarantees: extraction never panics, and everything it returns
// parses as a valid address or CIDR.
fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if text.len() <= 64 * 1024 {
            for expr in extract_ip_nets(text) {
                assert!(parse_ip_net(&expr).is_ok(), "extractor produced '{expr}'");
            }
        }
    }
});
