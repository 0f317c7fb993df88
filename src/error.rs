//! Unified error types for the Hydrobot firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! cadence loops' error handling uniform.  All variants are `Copy` so they
//! can be handed to the notifier and the backoff counters without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The moisture sensor could not be read.
    Sensor(SensorFault),
    /// A pump drive command failed.
    Actuator(ActuatorFault),
    /// Operator input or stored configuration is invalid.
    Config(ConfigError),
    /// A persisted record could not be read or written.
    Persistence(PersistenceFault),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Persistence(e) => write!(f, "persistence: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    /// The digital read kept failing until the read timeout elapsed.
    Timeout,
    /// The GPIO read returned an error.
    ReadFailed,
    /// Edge mode has neither a seed sample nor a reported transition yet.
    NotReady,
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "read timed out"),
            Self::ReadFailed => write!(f, "GPIO read failed"),
            Self::NotReady => write!(f, "no sensor level available yet"),
        }
    }
}

impl std::error::Error for SensorFault {}

impl From<SensorFault> for Error {
    fn from(e: SensorFault) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorFault {
    /// The "on" command failed; the line was driven back off.
    DriveFailed,
    /// The "off" command failed on every retry.  The pump may still be live.
    ReleaseFailed,
    /// A zero-length activation was requested.
    InvalidDuration,
}

impl fmt::Display for ActuatorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DriveFailed => write!(f, "pump drive command failed"),
            Self::ReleaseFailed => write!(f, "pump release command failed"),
            Self::InvalidDuration => write!(f, "invalid activation duration"),
        }
    }
}

impl std::error::Error for ActuatorFault {}

impl From<ActuatorFault> for Error {
    fn from(e: ActuatorFault) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A schedule string was not a valid 24-hour `HH:MM`.
    InvalidTime,
    /// A moisture check frequency outside the accepted range.
    FrequencyOutOfRange(u32),
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTime => write!(f, "expected a 24-hour time as HH:MM"),
            Self::FrequencyOutOfRange(secs) => {
                write!(f, "check frequency {secs}s is out of range")
            }
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Persistence faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceFault {
    /// The storage backend failed to read a record.
    ReadFailed,
    /// The storage backend failed to write a record.
    WriteFailed,
    /// A stored record could not be decoded.
    Corrupted,
    /// A record could not be encoded.
    EncodeFailed,
}

impl fmt::Display for PersistenceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "storage read failed"),
            Self::WriteFailed => write!(f, "storage write failed"),
            Self::Corrupted => write!(f, "stored record corrupted"),
            Self::EncodeFailed => write!(f, "record encoding failed"),
        }
    }
}

impl std::error::Error for PersistenceFault {}

impl From<PersistenceFault> for Error {
    fn from(e: PersistenceFault) -> Self {
        Self::Persistence(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
