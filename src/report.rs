//! Weekly CSV report of the event log.
//!
//! One row per event from the last seven days, oldest first:
//!
//! ```text
//! Timestamp,Trigger,Moisture
//! 2024-06-01 08:00,scheduled,dry
//! 2024-06-01 12:30,check,wet
//! 2024-06-02 09:15,manual,
//! ```
//!
//! An empty moisture column means the activation ran without a reading.

use core::fmt::Write;

use chrono::{Duration, NaiveDateTime};

use crate::recorder::{EventRecorder, WateringEvent};

pub const REPORT_HEADER: &str = "Timestamp,Trigger,Moisture";
pub const REPORT_FILE_NAME: &str = "weekly_report.csv";

/// How far back the weekly report looks.
pub fn report_period() -> Duration {
    Duration::days(7)
}

/// Render `events` as CSV.
pub fn render_csv(events: &[WateringEvent]) -> String {
    let mut out = String::with_capacity(32 * (events.len() + 1));
    out.push_str(REPORT_HEADER);
    out.push('\n');
    for e in events {
        let _ = write!(out, "{},{},", e.at.format("%Y-%m-%d %H:%M"), e.kind);
        if let Some(m) = e.moisture {
            let _ = write!(out, "{m}");
        }
        out.push('\n');
    }
    out
}

/// A rendered report and the number of rows in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyReport {
    pub events: usize,
    pub csv: String,
}

/// CSV of every event recorded in the seven days before `now`.
pub fn weekly_report(recorder: &EventRecorder, now: NaiveDateTime) -> WeeklyReport {
    let events = recorder.query(now - report_period());
    WeeklyReport {
        events: events.len(),
        csv: render_csv(&events),
    }
}
