//! Integration tests for the cadence threads and the operator console.

use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use hydrobot::app::cadence::{Cadences, ShutdownSignal};
use hydrobot::app::console::run_console;
use hydrobot::app::events::{CadenceId, Notice};
use hydrobot::config::SystemConfig;
use hydrobot::error::{ActuatorFault, Error};

use crate::mock_hw::{Rig, at, test_config};

fn fast_config() -> SystemConfig {
    SystemConfig {
        schedule_poll_secs: 1,
        schedule_cooldown_secs: 1,
        ..test_config()
    }
}

fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    cond()
}

#[test]
fn schedule_cadence_waters_and_stops_cleanly() {
    let rig = Rig::with_config(fast_config());
    rig.control.set_schedule("08:00").unwrap();
    rig.clock.set(at(8, 0, 0));

    let shutdown = Arc::new(ShutdownSignal::new());
    let cadences = Cadences::spawn(Arc::clone(&rig.control), Arc::clone(&shutdown)).unwrap();

    assert!(wait_for(Duration::from_secs(3), || rig.pump_runs() == 1));

    let started = Instant::now();
    shutdown.trigger();
    cadences.join();
    assert!(started.elapsed() < Duration::from_secs(3), "waits are interruptible");

    assert_eq!(rig.pump_runs(), 1);
    assert!(rig.pump_is_off());
}

#[test]
fn cadence_fault_is_notified_then_recovery() {
    let rig = Rig::with_config(fast_config());
    rig.control.set_schedule("08:00").unwrap();
    rig.clock.set(at(8, 0, 0));
    rig.pump.fail_writes_of(Some(false));

    let shutdown = Arc::new(ShutdownSignal::new());
    let cadences = Cadences::spawn(Arc::clone(&rig.control), Arc::clone(&shutdown)).unwrap();

    let fault = Notice::Fault {
        cadence: CadenceId::Schedule,
        error: Error::Actuator(ActuatorFault::DriveFailed),
    };
    assert!(wait_for(Duration::from_secs(3), || {
        rig.notifier.count(|n| *n == fault) >= 1
    }));
    assert!(rig.pump_is_off());

    rig.pump.fail_writes_of(None);
    let recovered = Notice::Recovered {
        cadence: CadenceId::Schedule,
    };
    assert!(wait_for(Duration::from_secs(5), || {
        rig.notifier.count(|n| *n == recovered) == 1
    }));

    shutdown.trigger();
    cadences.join();
    assert_eq!(rig.pump_runs(), 1);
}

#[test]
fn console_dispatches_slash_commands() {
    let rig = Rig::new();
    let shutdown = ShutdownSignal::new();
    let input = Cursor::new("/setSchedule 08:00\n\n/schedule\n/bogus\n/help\n/setSchedule 25:00\n");
    let mut output = Vec::new();

    let dispatched = run_console(&rig.control, &shutdown, input, &mut output).unwrap();
    assert_eq!(dispatched, 3);

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("Schedule set to 08:00"));
    assert!(text.contains("Watering daily at 08:00"));
    assert!(text.contains("I did not understand that command"));
    assert!(text.contains("/waternow - Water the plants now"));
    assert!(text.contains("Error: config: expected a 24-hour time as HH:MM"));
}

#[test]
fn console_stops_on_shutdown() {
    let rig = Rig::new();
    let shutdown = ShutdownSignal::new();
    shutdown.trigger();
    let dispatched =
        run_console(&rig.control, &shutdown, Cursor::new("/waternow\n"), Vec::new()).unwrap();
    assert_eq!(dispatched, 0);
    assert_eq!(rig.pump_runs(), 0);
}

/// Writer that only exposes what was flushed.
#[derive(Clone, Default)]
struct FlushedOutput {
    pending: Vec<u8>,
    flushed: Arc<Mutex<Vec<u8>>>,
}

impl FlushedOutput {
    fn text(&self) -> String {
        String::from_utf8(self.flushed.lock().unwrap().clone()).unwrap()
    }
}

impl Write for FlushedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushed.lock().unwrap().append(&mut self.pending);
        Ok(())
    }
}

#[test]
fn console_help_is_flushed() {
    let rig = Rig::new();
    let shutdown = ShutdownSignal::new();
    let output = FlushedOutput::default();

    run_console(&rig.control, &shutdown, Cursor::new("/help\n"), output.clone()).unwrap();
    assert!(output.text().contains("/lastWatered - When the pump last ran"));
}

#[test]
fn console_shutdown_command_stops_cadences_and_releases_pump() {
    let rig = Rig::with_config(fast_config());
    let shutdown = Arc::new(ShutdownSignal::new());
    let cadences = Cadences::spawn(Arc::clone(&rig.control), Arc::clone(&shutdown)).unwrap();

    let mut output = Vec::new();
    let dispatched = run_console(
        &rig.control,
        &shutdown,
        Cursor::new("/shutdown\n/waternow\n"),
        &mut output,
    )
    .unwrap();

    assert_eq!(dispatched, 0);
    assert!(shutdown.is_triggered());
    assert!(String::from_utf8(output).unwrap().contains("Shutting down"));

    let started = Instant::now();
    cadences.join();
    assert!(started.elapsed() < Duration::from_secs(3));
    rig.control.shutdown().unwrap();
    assert!(rig.pump_is_off());
    assert_eq!(rig.pump_runs(), 0);
}
