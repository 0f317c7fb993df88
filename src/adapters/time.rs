//! Wall-clock adapter.
//!
//! Implements [`Clock`] with local time of day, the time base the
//! operator's `HH:MM` schedule is expressed in.
//!
//! - **`target_os = "espidf"`**: `gettimeofday()` + `localtime_r()` from
//!   newlib, honouring the `TZ` the firmware configured.
//! - **`not(target_os = "espidf")`**: `chrono::Local`.

use chrono::NaiveDateTime;

use crate::app::ports::Clock;

/// Anything before 2020-01-01 means the RTC was never set.
const EPOCH_2020: i64 = 1_577_836_800;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }

    /// Seconds since the Unix epoch.
    #[cfg(target_os = "espidf")]
    fn epoch_secs() -> i64 {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: tv is a valid out-param; the timezone argument may be null.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return 0;
        }
        tv.tv_sec as i64
    }

    #[cfg(not(target_os = "espidf"))]
    fn epoch_secs() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// `false` until the wall clock has been set (SNTP, RTC or manually).
    pub fn is_synced(&self) -> bool {
        Self::epoch_secs() >= EPOCH_2020
    }
}

#[cfg(target_os = "espidf")]
impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let secs = Self::epoch_secs() as esp_idf_svc::sys::time_t;
        // SAFETY: `tm` is plain data; localtime_r fills it or returns null.
        let mut tm: esp_idf_svc::sys::tm = unsafe { core::mem::zeroed() };
        let local = unsafe { esp_idf_svc::sys::localtime_r(&secs, &mut tm) };
        let fallback = || {
            chrono::DateTime::from_timestamp(secs as i64, 0)
                .map(|t| t.naive_utc())
                .unwrap_or_default()
        };
        if local.is_null() {
            return fallback();
        }
        chrono::NaiveDate::from_ymd_opt(tm.tm_year + 1900, (tm.tm_mon + 1) as u32, tm.tm_mday as u32)
            .and_then(|d| d.and_hms_opt(tm.tm_hour as u32, tm.tm_min as u32, tm.tm_sec as u32))
            .unwrap_or_else(fallback)
    }
}

#[cfg(not(target_os = "espidf"))]
impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}
