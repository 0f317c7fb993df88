//! Integration tests for the ControlLoop → governor → pump → recorder path.
//!
//! Every test drives a real [`ControlLoop`] wired to the mocks in
//! `mock_hw`; nothing touches real GPIO or flash.

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Duration as ChronoDuration;

use hydrobot::app::commands::{OperatorCommand, Reply};
use hydrobot::app::control_loop::{Outcome, TickOutcome};
use hydrobot::app::events::Notice;
use hydrobot::error::{ActuatorFault, ConfigError, Error, PersistenceFault, SensorFault};
use hydrobot::recorder::EventKind;
use hydrobot::report::{REPORT_FILE_NAME, REPORT_HEADER};
use hydrobot::safety::{SkipReason, TriggerKind};
use hydrobot::schedule::TimeOfDay;
use hydrobot::sensors::moisture::MoistureReading;

use crate::mock_hw::{Rig, at, day, test_config};

fn no_dedup() -> hydrobot::config::SystemConfig {
    hydrobot::config::SystemConfig {
        dedup_window_ms: 0,
        ..test_config()
    }
}

fn eight() -> TimeOfDay {
    TimeOfDay::new(8, 0).unwrap()
}

// ── Schedule window ───────────────────────────────────────────

#[test]
fn schedule_window_polled_every_30s_waters_once() {
    let rig = Rig::new();
    rig.control.set_schedule("08:00").unwrap();

    let mut outcomes = Vec::new();
    for secs in [0, 30, 60, 90, 120] {
        rig.clock.set(at(8, 0, 0) + ChronoDuration::seconds(secs));
        outcomes.push(rig.control.schedule_tick().unwrap());
    }

    assert!(matches!(outcomes[0], TickOutcome::Ran(Outcome::Activated(_))));
    assert!(outcomes[1..].iter().all(|o| *o == TickOutcome::Idle));
    assert_eq!(rig.pump_runs(), 1);
    assert_eq!(rig.control.recorder().len(), 1);
    assert!(rig.pump_is_off());
}

#[test]
fn schedule_due_at_window_edge_but_not_after() {
    let rig = Rig::new();
    rig.control.set_schedule("08:00").unwrap();

    rig.clock.set(at(8, 3, 0));
    assert_eq!(rig.control.schedule_tick().unwrap(), TickOutcome::Idle);
    assert_eq!(rig.pump_runs(), 0);

    // A late first poll inside the window still fires.
    let rig = Rig::new();
    rig.control.set_schedule("08:00").unwrap();
    rig.clock.set(at(8, 2, 59));
    assert!(rig.control.schedule_tick().unwrap().watered());
    assert_eq!(rig.pump_runs(), 1);
}

#[test]
fn schedule_fires_again_the_next_day() {
    let rig = Rig::with_config(no_dedup());
    rig.control.set_schedule("08:00").unwrap();

    rig.clock.set(at(8, 0, 10));
    assert!(rig.control.schedule_tick().unwrap().watered());
    rig.clock.set(day(2).and_hms_opt(8, 1, 0).unwrap());
    assert!(rig.control.schedule_tick().unwrap().watered());
    assert_eq!(rig.pump_runs(), 2);
}

#[test]
fn no_schedule_never_fires() {
    let rig = Rig::new();
    rig.clock.set(at(8, 0, 0));
    assert_eq!(rig.control.schedule_tick().unwrap(), TickOutcome::Idle);
    assert_eq!(rig.pump_runs(), 0);
}

#[test]
fn scheduled_watering_ignores_wet_soil() {
    let rig = Rig::new();
    rig.sensor.set_wet();
    rig.control.set_schedule("08:00").unwrap();
    rig.clock.set(at(8, 0, 0));

    let TickOutcome::Ran(Outcome::Activated(event)) = rig.control.schedule_tick().unwrap() else {
        panic!("scheduled watering must activate");
    };
    assert_eq!(event.kind, EventKind::Scheduled);
    assert_eq!(event.moisture, Some(MoistureReading::Wet));
}

#[test]
fn failed_scheduled_activation_is_retried_next_poll() {
    let rig = Rig::new();
    rig.control.set_schedule("08:00").unwrap();
    rig.pump.fail_writes_of(Some(false));

    rig.clock.set(at(8, 0, 0));
    assert_eq!(
        rig.control.schedule_tick(),
        Err(Error::Actuator(ActuatorFault::DriveFailed))
    );

    rig.pump.fail_writes_of(None);
    rig.clock.set(at(8, 0, 30));
    assert!(rig.control.schedule_tick().unwrap().watered());
    assert_eq!(rig.pump_runs(), 1);
}

// ── Serialization & dedup ─────────────────────────────────────

#[test]
fn concurrent_manual_and_scheduled_water_once() {
    let rig = Rig::new();
    rig.control.set_schedule("08:00").unwrap();
    rig.clock.set(at(8, 0, 0));

    let barrier = Arc::new(Barrier::new(2));
    let manual = {
        let control = Arc::clone(&rig.control);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            control.water_now()
        })
    };
    let scheduled = {
        let control = Arc::clone(&rig.control);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            control.schedule_tick()
        })
    };

    let manual = manual.join().unwrap().unwrap();
    let scheduled = scheduled.join().unwrap().unwrap();

    assert_eq!(rig.pump_runs(), 1, "exactly one serialized activation");
    assert_eq!(rig.control.recorder().len(), 1, "exactly one log entry");

    let coalesced = [
        manual == Outcome::Coalesced,
        scheduled == TickOutcome::Ran(Outcome::Coalesced),
    ];
    assert_eq!(coalesced.iter().filter(|c| **c).count(), 1);

    // The window counts as served either way.
    rig.clock.set(at(8, 1, 0));
    assert_eq!(rig.control.schedule_tick().unwrap(), TickOutcome::Idle);
    assert!(rig.pump_is_off());
}

#[test]
fn back_to_back_manual_requests_are_coalesced() {
    let rig = Rig::new();
    assert!(matches!(rig.control.water_now(), Ok(Outcome::Activated(_))));
    assert_eq!(rig.control.water_now(), Ok(Outcome::Coalesced));
    assert_eq!(rig.pump_runs(), 1);
}

#[test]
fn dry_tick_coalesced_into_manual_run_is_not_counted() {
    let rig = Rig::new();
    rig.control.set_check_frequency(60).unwrap();
    rig.sensor.set_dry();

    assert!(matches!(rig.control.water_now(), Ok(Outcome::Activated(_))));
    assert_eq!(
        rig.control.moisture_tick().unwrap(),
        TickOutcome::Ran(Outcome::Coalesced)
    );
    assert_eq!(rig.control.dry_streak(), 0);
    assert_eq!(rig.pump_runs(), 1);
    assert_eq!(rig.control.recorder().len(), 1);
}

// ── Pump faults ───────────────────────────────────────────────

#[test]
fn drive_fault_leaves_line_off_and_logs_nothing() {
    let rig = Rig::new();
    rig.pump.fail_writes_of(Some(false));

    assert_eq!(
        rig.control.water_now(),
        Err(Error::Actuator(ActuatorFault::DriveFailed))
    );
    assert!(rig.pump_is_off());
    assert!(rig.control.recorder().is_empty());
    assert_eq!(rig.control.last_watered(), None);
}

#[test]
fn release_fault_is_reported_and_shutdown_retries_it() {
    let rig = Rig::new();
    rig.pump.fail_writes_of(Some(true));

    assert_eq!(
        rig.control.water_now(),
        Err(Error::Actuator(ActuatorFault::ReleaseFailed))
    );

    rig.pump.fail_writes_of(None);
    rig.control.shutdown().unwrap();
    assert!(rig.pump_is_off());
}

// ── Safety governor through the moisture cadence ──────────────

#[test]
fn moisture_tick_disabled_by_default() {
    let rig = Rig::new();
    rig.sensor.set_dry();
    assert_eq!(rig.control.moisture_tick().unwrap(), TickOutcome::Disabled);
    assert_eq!(rig.pump_runs(), 0);
}

#[test]
fn persistent_dryness_is_limited_then_capped() {
    let rig = Rig::with_config(no_dedup());
    rig.control.set_check_frequency(60).unwrap();
    rig.sensor.set_dry();

    let outcomes: Vec<_> = (0..12)
        .map(|_| rig.control.moisture_tick().unwrap())
        .collect();

    let activated = outcomes.iter().filter(|o| o.watered()).count();
    assert_eq!(activated, 5);
    assert!(outcomes[5..10]
        .iter()
        .all(|o| *o == TickOutcome::Ran(Outcome::Skipped(SkipReason::ActuationSuppressed))));
    assert!(outcomes[10..]
        .iter()
        .all(|o| *o == TickOutcome::Ran(Outcome::Skipped(SkipReason::CapReached))));
    assert_eq!(rig.pump_runs(), 5);

    // Each skip reason is notified once, not per tick.
    let skipped = |reason| {
        rig.notifier.count(|n| {
            *n == Notice::Skipped {
                trigger: TriggerKind::MoistureTriggered,
                reason,
            }
        })
    };
    assert_eq!(skipped(SkipReason::ActuationSuppressed), 1);
    assert_eq!(skipped(SkipReason::CapReached), 1);
}

#[test]
fn wet_reading_rearms_the_governor() {
    let rig = Rig::with_config(no_dedup());
    rig.control.set_check_frequency(60).unwrap();
    rig.sensor.set_dry();
    for _ in 0..12 {
        rig.control.moisture_tick().unwrap();
    }

    rig.sensor.set_wet();
    assert_eq!(
        rig.control.moisture_tick().unwrap(),
        TickOutcome::Ran(Outcome::Skipped(SkipReason::SoilWet))
    );

    rig.sensor.set_dry();
    assert!(rig.control.moisture_tick().unwrap().watered());
    assert_eq!(rig.pump_runs(), 6);
}

#[test]
fn manual_watering_bypasses_the_cap() {
    let rig = Rig::with_config(no_dedup());
    rig.control.set_check_frequency(60).unwrap();
    rig.sensor.set_dry();
    for _ in 0..12 {
        rig.control.moisture_tick().unwrap();
    }
    assert!(matches!(rig.control.water_now(), Ok(Outcome::Activated(_))));
}

#[test]
fn sensor_fault_blocks_moisture_watering_only() {
    let rig = Rig::new();
    rig.control.set_check_frequency(60).unwrap();
    rig.sensor.set_failing();

    assert_eq!(
        rig.control.moisture_tick(),
        Err(Error::Sensor(SensorFault::Timeout))
    );
    assert_eq!(rig.pump_runs(), 0);

    let Ok(Outcome::Activated(event)) = rig.control.water_now() else {
        panic!("manual watering proceeds without a reading");
    };
    assert_eq!(event.moisture, None);
    assert_eq!(event.kind, EventKind::Manual);
}

#[test]
fn check_moisture_logs_without_watering() {
    let rig = Rig::new();
    rig.sensor.set_dry();
    assert_eq!(rig.control.check_moisture(), Ok(MoistureReading::Dry));
    assert_eq!(rig.pump_runs(), 0);

    let last = rig.control.recorder().last().unwrap();
    assert_eq!(last.kind, EventKind::MoistureCheck);
    assert!(!last.is_activation());
}

// ── Operator input & persistence ──────────────────────────────

#[test]
fn invalid_schedule_leaves_state_untouched() {
    let rig = Rig::new();
    rig.control.set_schedule("08:00").unwrap();
    let stored = rig.storage.raw("schedule", "time");

    for bad in ["8:00", "24:00", "08:60", "", "0800", "08:00pm"] {
        assert_eq!(
            rig.control.set_schedule(bad),
            Err(Error::Config(ConfigError::InvalidTime)),
            "{bad:?}"
        );
    }
    assert_eq!(rig.control.view_schedule(), Some(eight()));
    assert_eq!(rig.storage.raw("schedule", "time"), stored);
}

#[test]
fn schedule_write_failure_is_surfaced() {
    let rig = Rig::new();
    rig.control.set_schedule("08:00").unwrap();
    rig.storage.fail_writes(true);

    assert_eq!(
        rig.control.set_schedule("09:30"),
        Err(Error::Persistence(PersistenceFault::WriteFailed))
    );
    assert_eq!(rig.control.view_schedule(), Some(eight()));
}

#[test]
fn schedule_survives_reboot() {
    let rig = Rig::new();
    assert_eq!(rig.control.view_schedule(), None, "absent record means no schedule");

    rig.control.set_schedule(" 21:15 ").unwrap();
    let rebooted = rig.reboot(test_config());
    assert_eq!(rebooted.control.view_schedule(), TimeOfDay::new(21, 15));
}

#[test]
fn check_frequency_is_validated_and_persisted() {
    let rig = Rig::new();
    assert_eq!(
        rig.control.set_check_frequency(5),
        Err(Error::Config(ConfigError::FrequencyOutOfRange(5)))
    );
    assert_eq!(rig.control.check_frequency(), 0);

    rig.control.set_check_frequency(900).unwrap();
    assert_eq!(rig.reboot(test_config()).control.check_frequency(), 900);
}

#[test]
fn log_and_last_watered_survive_reboot() {
    let rig = Rig::with_config(no_dedup());
    for minute in 0..3 {
        rig.clock.set(at(9, minute, 0));
        rig.control.water_now().unwrap();
    }
    for _ in 0..40 {
        rig.control.check_moisture().unwrap();
    }

    let rebooted = rig.reboot(no_dedup());
    assert_eq!(rebooted.control.recorder().len(), 43);
    assert_eq!(rebooted.control.last_watered(), Some(at(9, 2, 0)));
}

#[test]
fn logging_failure_after_watering_is_reported() {
    let rig = Rig::new();
    rig.storage.fail_writes(true);

    assert_eq!(
        rig.control.water_now(),
        Err(Error::Persistence(PersistenceFault::WriteFailed))
    );
    assert_eq!(rig.pump_runs(), 1);
    assert!(rig.pump_is_off());
    assert!(rig.control.recorder().is_empty());
}

// ── Queries & reports ─────────────────────────────────────────

#[test]
fn events_since_is_ordered_and_filtered() {
    let rig = Rig::with_config(no_dedup());
    for h in [6, 7, 8, 9] {
        rig.clock.set(at(h, 0, 0));
        rig.control.water_now().unwrap();
    }

    let events = rig.control.events_since(at(7, 30, 0));
    let hours: Vec<_> = events.iter().map(|e| e.at).collect();
    assert_eq!(hours, vec![at(8, 0, 0), at(9, 0, 0)]);
    assert!(rig.control.events_since(at(10, 0, 0)).is_empty());
}

#[test]
fn weekly_report_covers_last_seven_days() {
    let rig = Rig::with_config(no_dedup());
    rig.sensor.set_dry();
    rig.clock.set(at(8, 0, 0));
    rig.control.water_now().unwrap();
    rig.clock.set(day(10).and_hms_opt(8, 0, 0).unwrap());
    rig.control.water_now().unwrap();

    assert_eq!(rig.control.send_weekly_report(), 1);

    let docs = rig.notifier.documents();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].0, REPORT_FILE_NAME);
    let csv = String::from_utf8(docs[0].1.clone()).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines, vec![REPORT_HEADER, "2024-06-10 08:00,manual,dry"]);
}

// ── Commands & notices ────────────────────────────────────────

#[test]
fn commands_dispatch_to_entry_points() {
    let rig = Rig::new();
    assert_eq!(
        rig.control
            .handle_command(OperatorCommand::SetSchedule("06:45".into())),
        Reply::ScheduleSet(TimeOfDay::new(6, 45).unwrap())
    );
    assert_eq!(
        rig.control.handle_command(OperatorCommand::ViewSchedule),
        Reply::Schedule(TimeOfDay::new(6, 45))
    );
    assert_eq!(
        rig.control.handle_command(OperatorCommand::LastWatered),
        Reply::LastWatered(None)
    );
    assert!(matches!(
        rig.control.handle_command(OperatorCommand::WaterNow),
        Reply::Watering(Outcome::Activated(_))
    ));
    assert_eq!(
        rig.control
            .handle_command(OperatorCommand::SetCheckFrequency(1)),
        Reply::Failed(Error::Config(ConfigError::FrequencyOutOfRange(1)))
    );
    assert_eq!(
        rig.control.handle_command(OperatorCommand::Report),
        Reply::ReportSent { events: 1 }
    );
}

#[test]
fn activation_and_startup_are_notified() {
    let rig = Rig::new();
    rig.control.announce();
    rig.sensor.set_dry();
    rig.control.water_now().unwrap();

    let notices = rig.notifier.notices();
    assert_eq!(notices[0], Notice::Started { schedule: None });
    assert_eq!(
        notices[1],
        Notice::Watered {
            trigger: TriggerKind::Manual,
            at: at(7, 0, 0),
            moisture: Some(MoistureReading::Dry),
        }
    );
}
