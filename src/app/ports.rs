//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ControlLoop (domain)
//! ```
//!
//! Driven adapters (pins, storage, clock, notifier) implement these traits.
//! The [`ControlLoop`](super::control_loop::ControlLoop) consumes them as
//! trait objects so the cadence threads can share one instance, and the
//! domain core never touches hardware directly.

use chrono::NaiveDateTime;

use crate::error::{ActuatorFault, SensorFault};

use super::events::Notice;

// ───────────────────────────────────────────────────────────────
// Digital lines (driven adapter: hardware ↔ domain)
// ───────────────────────────────────────────────────────────────

/// A digital input line the sensor reader can sample.
///
/// Object-safe wrapper around [`embedded_hal::digital::InputPin`]: the
/// blanket impl below covers every HAL pin, so drivers and mocks only
/// implement the HAL trait.
pub trait DigitalInput: Send {
    /// Sample the raw level: `true` = high.
    fn sample(&mut self) -> Result<bool, SensorFault>;
}

impl<P> DigitalInput for P
where
    P: embedded_hal::digital::InputPin + Send,
{
    fn sample(&mut self) -> Result<bool, SensorFault> {
        self.is_high().map_err(|_| SensorFault::ReadFailed)
    }
}

/// A digital output line the pump actuator can drive.
pub trait DigitalOutput: Send {
    /// Drive the raw level: `true` = high.
    fn drive(&mut self, high: bool) -> Result<(), ActuatorFault>;
}

impl<P> DigitalOutput for P
where
    P: embedded_hal::digital::OutputPin + Send,
{
    fn drive(&mut self, high: bool) -> Result<(), ActuatorFault> {
        let res = if high { self.set_high() } else { self.set_low() };
        res.map_err(|_| ActuatorFault::DriveFailed)
    }
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Local wall-clock time.  Schedules and event timestamps are naive local
/// times, matching what the operator types into `set_schedule`.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

// ───────────────────────────────────────────────────────────────
// Notifier port (driven adapter: domain → remote operator)
// ───────────────────────────────────────────────────────────────

/// The domain emits human-readable [`Notice`]s and report documents
/// through this port.  Fire-and-forget: implementations must not block for
/// long and their failures are theirs to log, never the caller's problem.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);

    /// Deliver a named document (the weekly CSV report).
    fn send_document(&self, name: &str, contents: &[u8]);
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for the schedule, event log pages,
/// last-watered marker and configuration.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic: no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; the file backend
///   writes a temp file and renames it.
/// - Implementations are internally synchronised (`&self` everywhere) so a
///   single instance can be shared by the recorder and the control loop.
pub trait StoragePort: Send + Sync {
    /// Read a whole value.
    fn read(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Write a value atomically, replacing any previous value.
    fn write(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for StorageError {}
