//! Outbound operator notices.
//!
//! The [`ControlLoop`](super::control_loop::ControlLoop) and the cadence
//! threads emit these through the [`Notifier`](super::ports::Notifier)
//! port.  Adapters on the other side decide what to do with them: log to
//! serial, forward to a chat bot, etc.  `Display` renders the text an
//! operator would read.

use core::fmt;

use chrono::NaiveDateTime;

use crate::error::Error;
use crate::safety::{SkipReason, TriggerKind};
use crate::sensors::moisture::MoistureReading;

/// Which periodic evaluation a fault or recovery belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceId {
    Schedule,
    Moisture,
}

impl fmt::Display for CadenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schedule => write!(f, "schedule"),
            Self::Moisture => write!(f, "moisture"),
        }
    }
}

/// Human-facing notices emitted by the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The controller has started with the given schedule.
    Started { schedule: Option<crate::schedule::TimeOfDay> },

    /// The pump completed one activation.
    Watered {
        trigger: TriggerKind,
        at: NaiveDateTime,
        moisture: Option<MoistureReading>,
    },

    /// An automatic evaluation decided not to water.
    Skipped { trigger: TriggerKind, reason: SkipReason },

    /// A tick on one cadence failed.  The cadence keeps running.
    Fault { cadence: CadenceId, error: Error },

    /// A cadence that was failing succeeded again.
    Recovered { cadence: CadenceId },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { schedule: Some(t) } => {
                write!(f, "Hydrobot started, watering daily at {t}")
            }
            Self::Started { schedule: None } => {
                write!(f, "Hydrobot started, no schedule set")
            }
            Self::Watered {
                trigger,
                at,
                moisture,
            } => {
                write!(f, "Watered ({trigger}) at {}", at.format("%Y-%m-%d %H:%M"))?;
                if let Some(m) = moisture {
                    write!(f, ", soil was {m}")?;
                }
                Ok(())
            }
            Self::Skipped { trigger, reason } => {
                write!(f, "Skipped {trigger} watering: {reason}")
            }
            Self::Fault { cadence, error } => {
                write!(f, "The {cadence} check failed: {error}")
            }
            Self::Recovered { cadence } => {
                write!(f, "The {cadence} check is working again")
            }
        }
    }
}
