#![no_main]

use libfuzzer_sys::fuzz_target;
use mpisonar::timeline::parse_line;

fuzz_target!(|data: &[u8]| {
    // Convert arbitrary bytes to UTF-8 string (lossy conversion)
    if let Ok(input) = std::str::from_utf8(data) {
        // A log line either parses into (tag, start, duration) or is
        // rejected; it must never panic.
        let _ = parse_line(input);
    }
});
