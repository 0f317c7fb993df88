//! System configuration parameters
//!
//! All tunable parameters for the Hydrobot system, including the wiring
//! (pin numbers and polarities) since these differ between deployments.
//! Stored as JSON under `config/system`; absent or unreadable config
//! falls back to [`SystemConfig::default()`].

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{StorageError, StoragePort};
use crate::drivers::pump::{MAX_ACTIVATION, PumpPolarity};
use crate::error::{ConfigError, PersistenceFault};
use crate::pins;
use crate::sensors::SensorMode;
use crate::sensors::moisture::SensorPolarity;

const CONFIG_NAMESPACE: &str = "config";
const CONFIG_KEY: &str = "system";

/// Smallest non-zero moisture check frequency accepted from the operator.
pub const MIN_CHECK_FREQUENCY_SECS: u32 = 10;
/// Largest moisture check frequency accepted from the operator (one day).
pub const MAX_CHECK_FREQUENCY_SECS: u32 = 86_400;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Wiring ---
    /// GPIO of the moisture sensor digital output.
    pub sensor_gpio: i32,
    /// Which raw level means "wet".
    pub sensor_polarity: SensorPolarity,
    /// Polling or interrupt-driven sensor backend.
    pub sensor_mode: SensorMode,
    /// GPIO of the pump relay.
    pub pump_gpio: i32,
    /// Which raw level switches the pump on.
    pub pump_polarity: PumpPolarity,

    // --- Sensor ---
    /// Edge reports of the same transition within this window collapse (ms).
    pub debounce_ms: u32,
    /// A sensor read that keeps failing gives up after this long (ms).
    pub sensor_timeout_ms: u32,

    // --- Pump ---
    /// How long one activation keeps the pump on (ms).
    pub watering_duration_ms: u32,
    /// Requests within this long after an activation are coalesced (ms).
    pub dedup_window_ms: u32,

    // --- Schedule ---
    /// Grace period after the scheduled minute during which it is due.
    pub schedule_window_minutes: u16,
    /// Schedule cadence polling interval (seconds).
    pub schedule_poll_secs: u32,
    /// Pause after a scheduled activation before polling again (seconds).
    pub schedule_cooldown_secs: u32,

    // --- Moisture cadence ---
    /// Initial moisture check frequency (seconds, 0 = never auto-run).
    /// A frequency set by the operator is persisted separately and wins.
    pub check_frequency_secs: u32,

    // --- Safety ---
    /// Consecutive dry evaluations that still actuate the pump.
    pub actuate_limit: u32,
    /// Consecutive dry evaluations after which the interlock gives up.
    pub give_up_cap: u32,
    /// Consecutive cadence faults before the polling interval backs off.
    pub fault_backoff_threshold: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Wiring
            sensor_gpio: pins::MOISTURE_SENSOR_GPIO,
            sensor_polarity: SensorPolarity::WetLow,
            sensor_mode: SensorMode::Poll,
            pump_gpio: pins::PUMP_RELAY_GPIO,
            pump_polarity: PumpPolarity::ActiveLow,

            // Sensor
            debounce_ms: 300,
            sensor_timeout_ms: 500,

            // Pump
            watering_duration_ms: 1_000,
            dedup_window_ms: 5_000,

            // Schedule
            schedule_window_minutes: 2,
            schedule_poll_secs: 30,
            schedule_cooldown_secs: 60,

            // Moisture cadence
            check_frequency_secs: 0,

            // Safety
            actuate_limit: 5,
            give_up_cap: 10,
            fault_backoff_threshold: 3,
        }
    }
}

impl SystemConfig {
    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=pins::MAX_GPIO).contains(&self.sensor_gpio) {
            return Err(ConfigError::ValidationFailed("sensor_gpio must be 0–48"));
        }
        if !(0..=pins::MAX_GPIO).contains(&self.pump_gpio) {
            return Err(ConfigError::ValidationFailed("pump_gpio must be 0–48"));
        }
        if self.sensor_gpio == self.pump_gpio {
            return Err(ConfigError::ValidationFailed(
                "sensor_gpio and pump_gpio must differ",
            ));
        }
        if self.debounce_ms > 10_000 {
            return Err(ConfigError::ValidationFailed("debounce_ms must be 0–10000"));
        }
        if !(10..=10_000).contains(&self.sensor_timeout_ms) {
            return Err(ConfigError::ValidationFailed(
                "sensor_timeout_ms must be 10–10000",
            ));
        }
        if self.watering_duration_ms == 0
            || u128::from(self.watering_duration_ms) > MAX_ACTIVATION.as_millis()
        {
            return Err(ConfigError::ValidationFailed(
                "watering_duration_ms must be 1–10000",
            ));
        }
        if self.dedup_window_ms > 600_000 {
            return Err(ConfigError::ValidationFailed(
                "dedup_window_ms must be 0–600000",
            ));
        }
        if !(1..=60).contains(&self.schedule_window_minutes) {
            return Err(ConfigError::ValidationFailed(
                "schedule_window_minutes must be 1–60",
            ));
        }
        if !(1..=3_600).contains(&self.schedule_poll_secs) {
            return Err(ConfigError::ValidationFailed(
                "schedule_poll_secs must be 1–3600",
            ));
        }
        if self.schedule_cooldown_secs > 3_600 {
            return Err(ConfigError::ValidationFailed(
                "schedule_cooldown_secs must be 0–3600",
            ));
        }
        validate_check_frequency(self.check_frequency_secs)?;
        if self.give_up_cap == 0 || self.give_up_cap > 1_000 {
            return Err(ConfigError::ValidationFailed("give_up_cap must be 1–1000"));
        }
        if self.actuate_limit > self.give_up_cap {
            return Err(ConfigError::ValidationFailed(
                "actuate_limit must be <= give_up_cap",
            ));
        }
        if self.fault_backoff_threshold == 0 {
            return Err(ConfigError::ValidationFailed(
                "fault_backoff_threshold must be >= 1",
            ));
        }
        Ok(())
    }
}

/// `0` disables the moisture cadence; anything else must be in
/// `MIN_CHECK_FREQUENCY_SECS..=MAX_CHECK_FREQUENCY_SECS`.
pub fn validate_check_frequency(secs: u32) -> Result<(), ConfigError> {
    if secs == 0 || (MIN_CHECK_FREQUENCY_SECS..=MAX_CHECK_FREQUENCY_SECS).contains(&secs) {
        Ok(())
    } else {
        Err(ConfigError::FrequencyOutOfRange(secs))
    }
}

/// Load the stored configuration, falling back to defaults when it is
/// missing, unreadable, or fails validation.
pub fn load(storage: &dyn StoragePort) -> SystemConfig {
    let bytes = match storage.read(CONFIG_NAMESPACE, CONFIG_KEY) {
        Ok(bytes) => bytes,
        Err(StorageError::NotFound) => {
            info!("Config: none stored, using defaults");
            return SystemConfig::default();
        }
        Err(e) => {
            warn!("Config: read failed ({}), using defaults", e);
            return SystemConfig::default();
        }
    };

    let config: SystemConfig = match serde_json::from_slice(&bytes) {
        Ok(c) => c,
        Err(e) => {
            warn!("Config: stored record unreadable ({}), using defaults", e);
            return SystemConfig::default();
        }
    };

    match config.validate() {
        Ok(()) => {
            info!("Config: loaded from storage");
            config
        }
        Err(e) => {
            warn!("Config: stored record rejected ({}), using defaults", e);
            SystemConfig::default()
        }
    }
}

/// Whether a config record has ever been written.
pub fn is_stored(storage: &dyn StoragePort) -> bool {
    storage.exists(CONFIG_NAMESPACE, CONFIG_KEY)
}

/// Validate and persist configuration.
pub fn save(storage: &dyn StoragePort, config: &SystemConfig) -> crate::error::Result<()> {
    config.validate()?;
    let bytes = serde_json::to_vec_pretty(config).map_err(|_| PersistenceFault::EncodeFailed)?;
    storage
        .write(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)
        .map_err(|e| {
            warn!("Config: write failed ({})", e);
            PersistenceFault::WriteFailed
        })?;
    info!("Config: saved ({} bytes)", bytes.len());
    Ok(())
}
