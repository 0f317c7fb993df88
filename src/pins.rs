//! Default GPIO assignments for the Hydrobot controller board.
//!
//! These are only defaults for [`SystemConfig`](crate::config::SystemConfig):
//! deployments re-wire freely, so every driver takes its pin number and
//! polarity from configuration rather than from these constants.

// ---------------------------------------------------------------------------
// Soil moisture sensor (comparator module, digital output)
// ---------------------------------------------------------------------------

/// Digital input from the moisture comparator.  Reference wiring: LOW = wet.
pub const MOISTURE_SENSOR_GPIO: i32 = 21;

// ---------------------------------------------------------------------------
// Pump relay
// ---------------------------------------------------------------------------

/// Digital output to the pump relay.  Reference wiring: LOW = pump on.
pub const PUMP_RELAY_GPIO: i32 = 7;

/// Highest GPIO number accepted by config validation (ESP32-S3 has 0–48).
pub const MAX_GPIO: i32 = 48;
