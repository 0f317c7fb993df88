//! Fuzz target: `TimeOfDay` parser
//!
//! Feeds arbitrary text to the `HH:MM` parser and verifies:
//! - No panics under arbitrary input
//! - Anything accepted is in range and already canonical
//!
//! cargo fuzz run fuzz_time_of_day

#![no_main]

use hydrobot::schedule::TimeOfDay;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(t) = text.parse::<TimeOfDay>() {
        assert!(t.hour() < 24 && t.minute() < 60);
        assert_eq!(t.to_string(), text, "accepted input must be canonical");
        assert!(t.minute_of_day() < 1440);
    }
});
