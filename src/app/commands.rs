//! Inbound operator commands and their replies.
//!
//! These represent actions requested by the outside world (a chat bot, a
//! serial console, a test) that the
//! [`ControlLoop`](super::control_loop::ControlLoop) interprets and acts
//! upon.  Every command maps to exactly one control loop entry point.
//!
//! Commands also parse from the slash-command text an operator types on
//! the serial console (`/waternow`, `/setSchedule 08:00`, ...).

use core::fmt;
use core::str::FromStr;

use chrono::NaiveDateTime;

use super::control_loop::Outcome;
use crate::error::Error;
use crate::schedule::TimeOfDay;
use crate::sensors::moisture::MoistureReading;

/// Commands an operator can send into the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Run the pump once, now.
    WaterNow,
    /// Set the daily watering time from an `HH:MM` string.
    SetSchedule(String),
    /// Show the daily watering time.
    ViewSchedule,
    /// Read the sensor and log the reading without watering.
    CheckMoisture,
    /// Set the moisture cadence interval in seconds (0 disables it).
    SetCheckFrequency(u32),
    /// Send the weekly CSV report as a document.
    Report,
    /// Show when the pump last completed an activation.
    LastWatered,
}

/// Usage text for the slash-command console.
pub const HELP: &str = "\
/waternow - Water the plants now
/setSchedule HH:MM - Set the daily watering time (24-hour)
/schedule - View the daily watering time
/moisture - Check the soil moisture now
/checkFrequency SECS - Check moisture every SECS seconds (0 = off)
/report - Receive the weekly watering report
/lastWatered - When the pump last ran
/shutdown - Release the pump and stop the controller
/help - Show this help message";

/// Why a console line is not an [`OperatorCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseCommandError {
    /// Not a known command, or `/help`.
    Unknown,
    /// The command needs an argument; carries its usage line.
    MissingArgument(&'static str),
    /// The argument is not a number.
    BadNumber,
}

impl fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "I did not understand that command. Type /help"),
            Self::MissingArgument(usage) => write!(f, "Usage: {usage}"),
            Self::BadNumber => write!(f, "expected a whole number of seconds"),
        }
    }
}

impl std::error::Error for ParseCommandError {}

impl FromStr for OperatorCommand {
    type Err = ParseCommandError;

    /// Command names are case-insensitive; the argument follows one or
    /// more spaces.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (line, None),
        };
        match name.to_ascii_lowercase().as_str() {
            "/waternow" => Ok(Self::WaterNow),
            "/setschedule" => arg
                .map(|a| Self::SetSchedule(a.to_owned()))
                .ok_or(ParseCommandError::MissingArgument("/setSchedule HH:MM")),
            "/schedule" => Ok(Self::ViewSchedule),
            "/moisture" => Ok(Self::CheckMoisture),
            "/checkfrequency" => {
                let arg = arg.ok_or(ParseCommandError::MissingArgument("/checkFrequency SECS"))?;
                arg.parse()
                    .map(Self::SetCheckFrequency)
                    .map_err(|_| ParseCommandError::BadNumber)
            }
            "/report" => Ok(Self::Report),
            "/lastwatered" => Ok(Self::LastWatered),
            _ => Err(ParseCommandError::Unknown),
        }
    }
}

/// The control loop's answer to an [`OperatorCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Watering(Outcome),
    ScheduleSet(TimeOfDay),
    Schedule(Option<TimeOfDay>),
    Moisture(MoistureReading),
    CheckFrequencySet(u32),
    ReportSent { events: usize },
    LastWatered(Option<NaiveDateTime>),
    Failed(Error),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Watering(outcome) => write!(f, "{outcome}"),
            Self::ScheduleSet(t) => write!(f, "Schedule set to {t}"),
            Self::Schedule(Some(t)) => write!(f, "Watering daily at {t}"),
            Self::Schedule(None) => write!(f, "No schedule set"),
            Self::Moisture(m) => write!(f, "Soil is {m}"),
            Self::CheckFrequencySet(0) => write!(f, "Automatic moisture checks disabled"),
            Self::CheckFrequencySet(secs) => {
                write!(f, "Checking moisture every {secs} seconds")
            }
            Self::ReportSent { events } => write!(f, "Report sent ({events} events)"),
            Self::LastWatered(Some(at)) => {
                write!(f, "Last watered {}", at.format("%Y-%m-%d %H:%M"))
            }
            Self::LastWatered(None) => write!(f, "Never watered"),
            Self::Failed(e) => write!(f, "Error: {e}"),
        }
    }
}

impl<T: Into<Reply>> From<crate::error::Result<T>> for Reply {
    fn from(r: crate::error::Result<T>) -> Self {
        match r {
            Ok(v) => v.into(),
            Err(e) => Self::Failed(e),
        }
    }
}

impl From<Outcome> for Reply {
    fn from(o: Outcome) -> Self {
        Self::Watering(o)
    }
}

impl From<MoistureReading> for Reply {
    fn from(m: MoistureReading) -> Self {
        Self::Moisture(m)
    }
}
