//! Sensor subsystem: the soil moisture reader and its level backends.
//!
//! The reader sees the physical line through a [`LevelSource`], so the
//! control loop never knows whether the line is polled or reported by a
//! GPIO interrupt:
//!
//! ```text
//!   InputPin ──▶ PolledLevel ─┐
//!                             ├──▶ LevelSource ──▶ MoistureSensor ──▶ MoistureReading
//!   GPIO ISR ──▶ EdgeQueue ───┘       (raw bool)        (polarity)
//!                  └─▶ EdgeLevel
//! ```

pub mod edge;
pub mod moisture;

use serde::{Deserialize, Serialize};

use crate::error::SensorFault;

/// How the moisture line is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorMode {
    /// Sample the pin on every read.
    Poll,
    /// Track transitions reported by the GPIO interrupt, debounced.
    Edge,
}

/// A source of the raw digital level of the moisture line.
pub trait LevelSource: Send {
    /// Current raw level: `true` = high.
    fn level(&mut self) -> Result<bool, SensorFault>;
}
