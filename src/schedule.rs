//! Daily watering schedule matcher.
//!
//! A schedule is one optional time of day.  It is *due* for a grace window
//! of `window_minutes` after the scheduled minute, inclusive, compared on
//! wall-clock time of day at minute resolution:
//!
//! ```text
//!   due  <=>  (minute_of_day(now) - minute_of_day(schedule)) mod 1440 <= window
//! ```
//!
//! The window wraps at midnight, the same way overnight quiet hours do:
//! a 23:59 schedule with a 2 minute window is due at 23:59, 00:00 and 00:01.
//! Re-fire protection is not done here; the control loop remembers the
//! [`window_start`] it already served.

use core::fmt;
use core::str::FromStr;

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// A 24-hour wall-clock time with minute resolution.
///
/// Parses and prints as strict `HH:MM` (two digits each, `00:00`–`23:59`),
/// and serialises as that string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    /// `None` if `hour > 23` or `minute > 59`.
    pub const fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub const fn hour(self) -> u8 {
        self.hour
    }

    pub const fn minute(self) -> u8 {
        self.minute
    }

    /// Minutes since midnight, `0..1440`.
    pub const fn minute_of_day(self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }
}

impl FromStr for TimeOfDay {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = s.as_bytes();
        if b.len() != 5 || b[2] != b':' {
            return Err(ConfigError::InvalidTime);
        }
        let two_digits = |hi: u8, lo: u8| -> Option<u8> {
            (hi.is_ascii_digit() && lo.is_ascii_digit()).then(|| (hi - b'0') * 10 + (lo - b'0'))
        };
        let hour = two_digits(b[0], b[1]).ok_or(ConfigError::InvalidTime)?;
        let minute = two_digits(b[3], b[4]).ok_or(ConfigError::InvalidTime)?;
        Self::new(hour, minute).ok_or(ConfigError::InvalidTime)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Stateless schedule matcher with a fixed grace window.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleMatcher {
    window_minutes: u16,
}

impl Default for ScheduleMatcher {
    fn default() -> Self {
        Self::new(2)
    }
}

impl ScheduleMatcher {
    pub const fn new(window_minutes: u16) -> Self {
        Self { window_minutes }
    }

    pub const fn window_minutes(&self) -> u16 {
        self.window_minutes
    }

    /// True when `now` falls inside the window opened by `schedule`.
    pub fn is_due(&self, now: NaiveDateTime, schedule: Option<TimeOfDay>) -> bool {
        schedule.is_some_and(|t| self.minutes_into_window(now, t) <= self.window_minutes)
    }

    /// The instant the currently matching window opened, or `None` if the
    /// schedule is not due.  Identifies one window across repeated polls;
    /// a wrapped window started on the previous day.
    pub fn window_start(
        &self,
        now: NaiveDateTime,
        schedule: Option<TimeOfDay>,
    ) -> Option<NaiveDateTime> {
        let t = schedule?;
        let offset = self.minutes_into_window(now, t);
        if offset > self.window_minutes {
            return None;
        }
        let now_minute = now.with_second(0)?.with_nanosecond(0)?;
        Some(now_minute - Duration::minutes(i64::from(offset)))
    }

    fn minutes_into_window(&self, now: NaiveDateTime, t: TimeOfDay) -> u16 {
        let now_min = (now.hour() * 60 + now.minute()) as u16;
        (now_min + MINUTES_PER_DAY - t.minute_of_day()) % MINUTES_PER_DAY
    }
}
