//! Control loop: the hexagonal core.
//!
//! [`ControlLoop`] owns the sensor, the safety governor, the pump, the
//! schedule and the event log.  The cadence threads and the operator
//! entry points share one instance through an `Arc`; every path that can
//! run the pump goes through one lock covering
//! evaluate → actuate → record.
//!
//! ```text
//!  schedule cadence ─┐
//!  moisture cadence ─┼──▶ ┌───────────────── station lock ─────────────────┐
//!  operator command ─┘    │ sensor → dedup → governor → pump → recorder    │ ──▶ Notifier
//!                         └────────────────────────────────────────────────┘
//! ```
//!
//! ## Simultaneous requests
//!
//! First wins.  A request that takes the lock within the dedup window
//! after an activation completed is coalesced into it: no second pump
//! run, no second log entry, and no dry count against the governor.

use core::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use log::{error, info, warn};

use crate::config::{self, SystemConfig};
use crate::drivers::pump::PumpActuator;
use crate::error::{ActuatorFault, Error, Result};
use crate::persistence;
use crate::recorder::{EventKind, EventRecorder, WateringEvent};
use crate::report;
use crate::safety::{Decision, SafetyGovernor, SkipReason, TriggerKind};
use crate::schedule::{ScheduleMatcher, TimeOfDay};
use crate::sensors::moisture::{MoistureReading, MoistureSensor};

use super::commands::{OperatorCommand, Reply};
use super::events::Notice;
use super::ports::{Clock, Notifier, StoragePort};

// ───────────────────────────────────────────────────────────────
// Outcomes
// ───────────────────────────────────────────────────────────────

/// Result of one pass through the activation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The pump ran and the event was recorded.
    Activated(WateringEvent),
    /// Folded into an activation that just completed.
    Coalesced,
    /// The governor declined.
    Skipped(SkipReason),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activated(e) => write!(f, "Watered at {}", e.at.format("%H:%M")),
            Self::Coalesced => write!(f, "Already watered just now"),
            Self::Skipped(reason) => write!(f, "Not watered: {reason}"),
        }
    }
}

/// Result of one cadence tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The moisture cadence is switched off (`check_frequency == 0`).
    Disabled,
    /// Nothing to do this tick: not due, or this window was already served.
    Idle,
    /// The activation path ran.
    Ran(Outcome),
}

impl TickOutcome {
    /// True when the pump ran or a request was folded into a run.
    pub fn watered(&self) -> bool {
        matches!(self, Self::Ran(Outcome::Activated(_) | Outcome::Coalesced))
    }
}

// ───────────────────────────────────────────────────────────────
// Shared state
// ───────────────────────────────────────────────────────────────

/// Everything the activation lock protects.
pub struct Station {
    sensor: MoistureSensor,
    governor: SafetyGovernor,
    pump: PumpActuator,
    /// When the pump was last driven, for request coalescing.
    last_activation: Option<Instant>,
    /// Last skip reason notified, so a stuck sensor is reported once.
    last_skip: Option<SkipReason>,
}

/// The outward-facing ports the control loop talks to.
#[derive(Clone)]
pub struct Ports {
    pub storage: Arc<dyn StoragePort>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct ControlLoop {
    station: Mutex<Station>,
    schedule: Mutex<Option<TimeOfDay>>,
    /// Window start the schedule cadence already served.
    served_window: Mutex<Option<NaiveDateTime>>,
    check_frequency: AtomicU32,
    matcher: ScheduleMatcher,
    watering: Duration,
    dedup_window: Duration,
    recorder: EventRecorder,
    config: SystemConfig,
    storage: Arc<dyn StoragePort>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl ControlLoop {
    /// Assemble the loop and restore the persisted schedule, check
    /// frequency, last-watered marker and event log.  Unreadable records
    /// fall back to their defaults.
    pub fn new(
        config: SystemConfig,
        sensor: MoistureSensor,
        mut pump: PumpActuator,
        ports: Ports,
    ) -> Self {
        let storage = ports.storage;
        let schedule = persistence::load_schedule(storage.as_ref());
        let check_frequency = persistence::load_check_frequency(storage.as_ref())
            .filter(|secs| config::validate_check_frequency(*secs).is_ok())
            .unwrap_or(config.check_frequency_secs);
        pump.restore_last_watered(persistence::load_last_watered(storage.as_ref()));
        let recorder = EventRecorder::open(Arc::clone(&storage));

        info!(
            "ControlLoop: schedule={}, check_frequency={}s, {} events",
            schedule.map_or_else(|| "none".into(), |t| t.to_string()),
            check_frequency,
            recorder.len()
        );

        Self {
            station: Mutex::new(Station {
                sensor,
                governor: SafetyGovernor::new(&config),
                pump,
                last_activation: None,
                last_skip: None,
            }),
            schedule: Mutex::new(schedule),
            served_window: Mutex::new(None),
            check_frequency: AtomicU32::new(check_frequency),
            matcher: ScheduleMatcher::new(config.schedule_window_minutes),
            watering: Duration::from_millis(u64::from(config.watering_duration_ms)),
            dedup_window: Duration::from_millis(u64::from(config.dedup_window_ms)),
            recorder,
            config,
            storage,
            clock: ports.clock,
            notifier: ports.notifier,
        }
    }

    /// Tell the operator the controller is up.
    pub fn announce(&self) {
        self.notifier.notify(&Notice::Started {
            schedule: self.view_schedule(),
        });
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    // ── Cadence ticks ─────────────────────────────────────────

    /// One poll of the schedule cadence.
    ///
    /// Runs a scheduled activation when the schedule is due and the
    /// current window has not been served yet.  A window counts as served
    /// once the pump ran for it (or a request was coalesced into a run);
    /// a tick that failed before the pump ran is retried on the next poll.
    pub fn schedule_tick(&self) -> Result<TickOutcome> {
        let now = self.clock.now();
        let schedule = self.view_schedule();
        let Some(window) = self.matcher.window_start(now, schedule) else {
            return Ok(TickOutcome::Idle);
        };

        if *lock(&self.served_window) == Some(window) {
            return Ok(TickOutcome::Idle);
        }

        let result = self.activate_and_log(TriggerKind::Scheduled);
        let pump_ran = match &result {
            Ok(_) => true,
            Err(Error::Persistence(_) | Error::Actuator(ActuatorFault::ReleaseFailed)) => true,
            Err(_) => false,
        };
        if pump_ran {
            *lock(&self.served_window) = Some(window);
        }
        result.map(TickOutcome::Ran)
    }

    /// One run of the moisture cadence.  A sensor fault is returned for
    /// the cadence to count; it never reaches the pump.
    pub fn moisture_tick(&self) -> Result<TickOutcome> {
        if self.check_frequency() == 0 {
            return Ok(TickOutcome::Disabled);
        }
        self.activate_and_log(TriggerKind::MoistureTriggered)
            .map(TickOutcome::Ran)
    }

    // ── Operator entry points ─────────────────────────────────

    /// Run the pump once, now.
    pub fn water_now(&self) -> Result<Outcome> {
        self.activate_and_log(TriggerKind::Manual)
    }

    /// Parse, persist, then adopt a new daily schedule.  Invalid input or a
    /// failed write leaves the current schedule untouched.
    pub fn set_schedule(&self, input: &str) -> Result<TimeOfDay> {
        let time: TimeOfDay = input.trim().parse()?;
        let mut schedule = lock(&self.schedule);
        persistence::save_schedule(self.storage.as_ref(), Some(time)).inspect_err(|e| {
            error!("ControlLoop: schedule not saved ({})", e);
        })?;
        *schedule = Some(time);
        info!("ControlLoop: schedule set to {}", time);
        Ok(time)
    }

    pub fn view_schedule(&self) -> Option<TimeOfDay> {
        *lock(&self.schedule)
    }

    /// Read the sensor and log a [`EventKind::MoistureCheck`] entry.
    pub fn check_moisture(&self) -> Result<MoistureReading> {
        let mut station = lock(&self.station);
        let reading = station.sensor.read()?;
        station.governor.observe(reading);
        self.recorder.append(WateringEvent::new(
            self.clock.now(),
            EventKind::MoistureCheck,
            Some(reading),
        ))?;
        Ok(reading)
    }

    /// Persist and adopt a new moisture check frequency (seconds, 0 = off).
    pub fn set_check_frequency(&self, secs: u32) -> Result<()> {
        config::validate_check_frequency(secs)?;
        persistence::save_check_frequency(self.storage.as_ref(), secs)?;
        self.check_frequency.store(secs, Ordering::Release);
        info!("ControlLoop: check frequency set to {}s", secs);
        Ok(())
    }

    pub fn check_frequency(&self) -> u32 {
        self.check_frequency.load(Ordering::Acquire)
    }

    pub fn last_watered(&self) -> Option<NaiveDateTime> {
        lock(&self.station).pump.last_watered()
    }

    pub fn events_since(&self, since: NaiveDateTime) -> Vec<WateringEvent> {
        self.recorder.query(since)
    }

    /// Consecutive dry evaluations counted by the safety governor.
    pub fn dry_streak(&self) -> u32 {
        lock(&self.station).governor.counter()
    }

    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    /// Send the last seven days of events as a CSV document.
    /// Returns the number of events in the report.
    pub fn send_weekly_report(&self) -> usize {
        let report = report::weekly_report(&self.recorder, self.clock.now());
        self.notifier
            .send_document(report::REPORT_FILE_NAME, report.csv.as_bytes());
        info!("ControlLoop: weekly report sent ({} events)", report.events);
        report.events
    }

    /// Dispatch one operator command.
    pub fn handle_command(&self, command: OperatorCommand) -> Reply {
        match command {
            OperatorCommand::WaterNow => self.water_now().into(),
            OperatorCommand::SetSchedule(input) => match self.set_schedule(&input) {
                Ok(t) => Reply::ScheduleSet(t),
                Err(e) => Reply::Failed(e),
            },
            OperatorCommand::ViewSchedule => Reply::Schedule(self.view_schedule()),
            OperatorCommand::CheckMoisture => self.check_moisture().into(),
            OperatorCommand::SetCheckFrequency(secs) => match self.set_check_frequency(secs) {
                Ok(()) => Reply::CheckFrequencySet(secs),
                Err(e) => Reply::Failed(e),
            },
            OperatorCommand::Report => Reply::ReportSent {
                events: self.send_weekly_report(),
            },
            OperatorCommand::LastWatered => Reply::LastWatered(self.last_watered()),
        }
    }

    /// Drive the pump off.  Waits for an in-flight activation to finish
    /// its own off step first.
    pub fn shutdown(&self) -> Result<()> {
        let mut station = lock(&self.station);
        station.pump.force_off()?;
        info!("ControlLoop: pump released for shutdown");
        Ok(())
    }

    // ── Activation path ───────────────────────────────────────

    /// Read, dedup, govern, actuate, record, notify; all under the
    /// station lock.
    fn activate_and_log(&self, trigger: TriggerKind) -> Result<Outcome> {
        let mut station = lock(&self.station);
        let station = &mut *station;

        let reading = match station.sensor.read() {
            Ok(r) => Some(r),
            Err(e) if trigger != TriggerKind::MoistureTriggered => {
                warn!("ControlLoop: {} watering without a reading ({})", trigger, e);
                None
            }
            Err(e) => return Err(e.into()),
        };

        if station
            .last_activation
            .is_some_and(|t| t.elapsed() < self.dedup_window)
        {
            // A coalesced request never counts as a dry evaluation.
            if let Some(r) = reading {
                station.governor.observe(r);
            }
            info!("ControlLoop: {} request coalesced into the previous run", trigger);
            return Ok(Outcome::Coalesced);
        }

        if let Decision::Skip(reason) = station.governor.evaluate(reading, trigger) {
            info!("ControlLoop: {} watering skipped: {}", trigger, reason);
            if reason != SkipReason::SoilWet && station.last_skip != Some(reason) {
                self.notifier.notify(&Notice::Skipped { trigger, reason });
            }
            station.last_skip = Some(reason);
            return Ok(Outcome::Skipped(reason));
        }
        station.last_skip = None;

        let activated = station.pump.activate(self.watering);
        if matches!(activated, Ok(_) | Err(ActuatorFault::ReleaseFailed)) {
            station.last_activation = Some(Instant::now());
        }
        let at = activated?;

        let event = WateringEvent::new(at, trigger.into(), reading);
        self.notifier.notify(&Notice::Watered {
            trigger,
            at: event.at,
            moisture: reading,
        });

        let marker = persistence::save_last_watered(self.storage.as_ref(), at);
        let logged = self.recorder.append(event);
        if let Err(e) = marker.and(logged) {
            error!("ControlLoop: activation at {} not fully persisted ({})", at, e);
            return Err(e.into());
        }
        Ok(Outcome::Activated(event))
    }
}

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
