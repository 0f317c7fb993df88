//! Water pump relay driver.
//!
//! Switches a relay (or MOSFET) on a single digital output for a bounded
//! duration, blocking only the calling thread.
//!
//! ## Safety contract
//!
//! - The line is only ever driven to the configured on/off levels.
//! - Every activation ends with the off command, on success, on a failed
//!   on command, and while unwinding (a [`Drop`] guard).
//! - No activation lasts longer than [`MAX_ACTIVATION`], whatever the
//!   configuration says.
//!
//! Concurrent activations are prevented by the control loop lock; this
//! driver is a dumb actuator.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::NaiveDateTime;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{Clock, DigitalOutput};
use crate::error::ActuatorFault;

/// Hard cap on one activation.
pub const MAX_ACTIVATION: Duration = Duration::from_secs(10);

/// Extra attempts at the off command before giving up.
pub const OFF_RETRIES: u32 = 3;

const OFF_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Which raw level switches the pump on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PumpPolarity {
    /// Low = on (reference wiring, active-low relay board).
    ActiveLow,
    /// High = on.
    ActiveHigh,
}

impl PumpPolarity {
    pub const fn on_level(self) -> bool {
        matches!(self, Self::ActiveHigh)
    }

    /// Raw level that keeps the pump off; output lines start here.
    pub const fn off_level(self) -> bool {
        !self.on_level()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Idle,
    Running,
}

pub struct PumpActuator {
    line: Box<dyn DigitalOutput>,
    polarity: PumpPolarity,
    clock: Arc<dyn Clock>,
    state: PumpState,
    last_watered: Option<NaiveDateTime>,
}

/// Releases the line if an activation unwinds before its explicit off step.
struct ReleaseGuard<'a> {
    pump: &'a mut PumpActuator,
    armed: bool,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Pump: activation aborted, releasing line");
            let _ = self.pump.release();
        }
    }
}

impl PumpActuator {
    /// Take over the line and drive it off.
    pub fn new(
        line: Box<dyn DigitalOutput>,
        polarity: PumpPolarity,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ActuatorFault> {
        let mut pump = Self {
            line,
            polarity,
            clock,
            state: PumpState::Running,
            last_watered: None,
        };
        pump.release()?;
        info!("Pump: ready ({:?})", polarity);
        Ok(pump)
    }

    /// Run the pump for `duration` (capped at [`MAX_ACTIVATION`]).
    ///
    /// Returns the completion time, which also becomes
    /// [`last_watered`](Self::last_watered).
    pub fn activate(&mut self, duration: Duration) -> Result<NaiveDateTime, ActuatorFault> {
        if duration.is_zero() {
            return Err(ActuatorFault::InvalidDuration);
        }
        let duration = if duration > MAX_ACTIVATION {
            warn!(
                "Pump: {}ms requested, capped at {}ms",
                duration.as_millis(),
                MAX_ACTIVATION.as_millis()
            );
            MAX_ACTIVATION
        } else {
            duration
        };

        let mut guard = ReleaseGuard {
            pump: self,
            armed: true,
        };

        let on_level = guard.pump.polarity.on_level();
        let on = guard.pump.line.drive(on_level);
        match on {
            Ok(()) => {
                guard.pump.state = PumpState::Running;
                thread::sleep(duration);
            }
            Err(e) => error!("Pump: on command failed ({})", e),
        }

        let off = guard.pump.release();
        guard.armed = false;
        drop(guard);

        on.map_err(|_| ActuatorFault::DriveFailed)?;
        off?;

        let at = self.clock.now();
        self.last_watered = Some(at);
        info!("Pump: ran {}ms", duration.as_millis());
        Ok(at)
    }

    /// Drive the line off immediately (shutdown path).
    pub fn force_off(&mut self) -> Result<(), ActuatorFault> {
        self.release()
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PumpState::Running
    }

    pub fn last_watered(&self) -> Option<NaiveDateTime> {
        self.last_watered
    }

    /// Seed the marker from persistent storage at startup.
    pub fn restore_last_watered(&mut self, at: Option<NaiveDateTime>) {
        self.last_watered = at;
    }

    // ── Internal ──────────────────────────────────────────────────

    fn release(&mut self) -> Result<(), ActuatorFault> {
        let off = self.polarity.off_level();
        for attempt in 0..=OFF_RETRIES {
            match self.line.drive(off) {
                Ok(()) => {
                    if attempt > 0 {
                        warn!("Pump: off command succeeded on retry {}", attempt);
                    }
                    self.state = PumpState::Idle;
                    return Ok(());
                }
                Err(e) => {
                    warn!("Pump: off command failed ({}), attempt {}", e, attempt + 1);
                    if attempt < OFF_RETRIES {
                        thread::sleep(OFF_RETRY_DELAY);
                    }
                }
            }
        }
        error!("PUMP RELEASE FAILED: line may still be live");
        Err(ActuatorFault::ReleaseFailed)
    }
}
