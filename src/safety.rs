//! Safety governor.
//!
//! Every pump request passes through [`SafetyGovernor::evaluate`] before
//! the actuator is touched.  Explicit intent (manual, scheduled) always
//! waters; moisture-triggered requests are capped so a stuck-dry or
//! miswired sensor cannot flood the pot or run the pump dry.
//!
//! ## Two thresholds
//!
//! ```text
//!   counter before eval:  0 ... actuate_limit ... give_up_cap
//!                         |--- Activate ---|--- Skip, counted ---|--- Skip, frozen
//! ```
//!
//! 1. While the counter is below `actuate_limit`, every dry evaluation
//!    counts and activates.
//! 2. Between `actuate_limit` and `give_up_cap`, dry evaluations still
//!    count but no longer actuate.
//! 3. At `give_up_cap` the counter freezes until a wet reading.
//!
//! Any wet reading resets the counter to zero, whatever the trigger.
//! The counter is deliberately volatile: it restarts at zero on boot.

use core::fmt;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::SystemConfig;
use crate::sensors::moisture::MoistureReading;

/// Why an activation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerKind {
    /// Operator asked for water now.
    Manual,
    /// The daily schedule window matched.
    Scheduled,
    /// The moisture cadence saw dry soil.
    MoistureTriggered,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::MoistureTriggered => write!(f, "moisture"),
        }
    }
}

/// Why an evaluation declined to water.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The soil is already wet.
    SoilWet,
    /// Counted towards the cap, but past the actuation limit.
    ActuationSuppressed,
    /// The give-up cap has been reached; waiting for a wet reading.
    CapReached,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SoilWet => write!(f, "soil already wet"),
            Self::ActuationSuppressed => write!(f, "actuation suppressed"),
            Self::CapReached => write!(f, "activation cap reached"),
        }
    }
}

/// Outcome of one governor evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Activate,
    Skip(SkipReason),
}

/// Consecutive-dry-activation interlock.
#[derive(Debug, Clone)]
pub struct SafetyGovernor {
    actuate_limit: u32,
    give_up_cap: u32,
    /// Consecutive dry moisture-triggered evaluations since the last wet
    /// reading.  Always `<= give_up_cap`.
    consecutive_dry: u32,
}

impl SafetyGovernor {
    pub fn new(config: &SystemConfig) -> Self {
        Self::with_limits(config.actuate_limit, config.give_up_cap)
    }

    pub fn with_limits(actuate_limit: u32, give_up_cap: u32) -> Self {
        Self {
            actuate_limit: actuate_limit.min(give_up_cap),
            give_up_cap,
            consecutive_dry: 0,
        }
    }

    /// Decide whether the pump may run.
    ///
    /// `reading` is `None` only when a manual or scheduled request
    /// proceeds despite a sensor fault.  A moisture-triggered request
    /// without a reading is treated as "no evidence of dryness".
    pub fn evaluate(&mut self, reading: Option<MoistureReading>, trigger: TriggerKind) -> Decision {
        if reading == Some(MoistureReading::Wet) {
            self.reset();
        }

        match trigger {
            TriggerKind::Manual | TriggerKind::Scheduled => Decision::Activate,
            TriggerKind::MoistureTriggered => match reading {
                Some(MoistureReading::Dry) => self.count_dry(),
                Some(MoistureReading::Wet) => Decision::Skip(SkipReason::SoilWet),
                None => {
                    warn!("Safety: moisture-triggered evaluation without a reading");
                    Decision::Skip(SkipReason::SoilWet)
                }
            },
        }
    }

    /// Feed a reading taken outside an evaluation (check-moisture).
    /// Only a wet reading has an effect: it resets the counter.
    pub fn observe(&mut self, reading: MoistureReading) {
        if reading == MoistureReading::Wet {
            self.reset();
        }
    }

    /// Current consecutive dry count.
    pub fn counter(&self) -> u32 {
        self.consecutive_dry
    }

    /// True once the give-up cap has been hit.
    pub fn is_capped(&self) -> bool {
        self.consecutive_dry >= self.give_up_cap
    }

    // ── Internal ──────────────────────────────────────────────────

    fn count_dry(&mut self) -> Decision {
        let n = self.consecutive_dry;
        if n >= self.give_up_cap {
            return Decision::Skip(SkipReason::CapReached);
        }

        self.consecutive_dry = n + 1;
        if self.consecutive_dry == self.give_up_cap {
            error!(
                "SAFETY CAP REACHED: {} consecutive dry readings, automatic watering halted",
                self.consecutive_dry
            );
        }

        if n < self.actuate_limit {
            Decision::Activate
        } else {
            if n == self.actuate_limit {
                warn!(
                    "Safety: {} consecutive dry activations, suppressing actuation",
                    n
                );
            }
            Decision::Skip(SkipReason::ActuationSuppressed)
        }
    }

    fn reset(&mut self) {
        if self.consecutive_dry != 0 {
            info!(
                "Safety: wet reading, counter reset (was {})",
                self.consecutive_dry
            );
        }
        self.consecutive_dry = 0;
    }
}
