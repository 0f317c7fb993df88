//! Fuzz target: event log page loader
//!
//! Stores arbitrary bytes as event pages and verifies:
//! - `EventRecorder::open` never panics on corrupt pages
//! - Whatever loads accepts further appends
//!
//! cargo fuzz run fuzz_event_page

#![no_main]

use std::sync::Arc;

use chrono::DateTime;
use hydrobot::adapters::nvs::NvsAdapter;
use hydrobot::app::ports::StoragePort;
use hydrobot::recorder::{EventKind, EventRecorder, WateringEvent};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(storage) = NvsAdapter::new() else {
        return;
    };
    // First byte splits the input into two pages.
    let split = data.first().map_or(0, |b| *b as usize).min(data.len());
    let (p0, p1) = data.split_at(split);
    let _ = storage.write("events", "p0", p0);
    let _ = storage.write("events", "p1", p1);

    let storage: Arc<dyn StoragePort> = Arc::new(storage);
    let recorder = EventRecorder::open(Arc::clone(&storage));
    let Some(epoch) = DateTime::from_timestamp(0, 0) else {
        return;
    };
    let _ = recorder.query(epoch.naive_utc());

    let before = recorder.len();
    let at = recorder.last().map_or(epoch.naive_utc(), |e| e.at);
    if recorder
        .append(WateringEvent::new(at, EventKind::Manual, None))
        .is_ok()
    {
        assert_eq!(recorder.len(), before + 1);
    }
});
