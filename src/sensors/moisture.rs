//! Binary soil moisture sensor.
//!
//! Comparator modules (FC-28, YL-69 and friends) expose a digital output
//! whose level flips when the probe resistance crosses the potentiometer
//! threshold.  Which level means "wet" depends on the module and on how it
//! is wired, so the polarity is a constructor parameter.
//!
//! ## Dual-target design
//!
//! The sensor only sees a [`DigitalInput`]; on ESP-IDF that is a
//! [`GpioPin`](crate::drivers::gpio::GpioPin), on host a simulated or mock pin.

use core::fmt;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::LevelSource;
use crate::app::ports::DigitalInput;
use crate::error::SensorFault;

/// Pause between attempts when a polled sample fails.
pub const SENSOR_RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Classified moisture state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoistureReading {
    Wet,
    Dry,
}

impl fmt::Display for MoistureReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wet => write!(f, "wet"),
            Self::Dry => write!(f, "dry"),
        }
    }
}

/// Which raw level the comparator drives when the soil is wet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorPolarity {
    /// Low = wet (reference wiring).
    WetLow,
    /// High = wet.
    WetHigh,
}

impl SensorPolarity {
    pub fn classify(self, high: bool) -> MoistureReading {
        match (self, high) {
            (Self::WetLow, false) | (Self::WetHigh, true) => MoistureReading::Wet,
            _ => MoistureReading::Dry,
        }
    }
}

/// Level source that samples the pin on every read.
///
/// A failing sample is retried every [`SENSOR_RETRY_INTERVAL`] until the
/// read timeout has elapsed, then the read fails with
/// [`SensorFault::Timeout`].
pub struct PolledLevel {
    pin: Box<dyn DigitalInput>,
    timeout: Duration,
}

impl PolledLevel {
    pub fn new(pin: Box<dyn DigitalInput>, timeout: Duration) -> Self {
        Self { pin, timeout }
    }
}

impl LevelSource for PolledLevel {
    fn level(&mut self) -> Result<bool, SensorFault> {
        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.pin.sample() {
                Ok(level) => {
                    if attempts > 1 {
                        debug!("Moisture: sample succeeded after {} attempts", attempts);
                    }
                    return Ok(level);
                }
                Err(e) => {
                    let elapsed = started.elapsed();
                    if elapsed >= self.timeout {
                        warn!(
                            "Moisture: read timed out after {} attempts ({})",
                            attempts, e
                        );
                        return Err(SensorFault::Timeout);
                    }
                    thread::sleep(SENSOR_RETRY_INTERVAL.min(self.timeout - elapsed));
                }
            }
        }
    }
}

/// Polarity-aware moisture sensor over any level backend.
pub struct MoistureSensor {
    source: Box<dyn LevelSource>,
    polarity: SensorPolarity,
    last: Option<MoistureReading>,
}

impl MoistureSensor {
    pub fn new(source: Box<dyn LevelSource>, polarity: SensorPolarity) -> Self {
        Self {
            source,
            polarity,
            last: None,
        }
    }

    /// Classify the current level of the line.
    pub fn read(&mut self) -> Result<MoistureReading, SensorFault> {
        let reading = self.polarity.classify(self.source.level()?);
        if self.last != Some(reading) {
            debug!("Moisture: soil is now {}", reading);
        }
        self.last = Some(reading);
        Ok(reading)
    }

    /// The most recent successful reading, if any.
    pub fn last_reading(&self) -> Option<MoistureReading> {
        self.last
    }

    pub fn polarity(&self) -> SensorPolarity {
        self.polarity
    }
}
