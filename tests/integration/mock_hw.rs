//! Mock hardware and port adapters for integration tests.
//!
//! Pins implement the `embedded-hal` traits directly, so the control loop
//! is exercised through the same blanket port impls as the real GPIO
//! driver.  Every handle is cheaply cloneable: the test keeps one clone to
//! script inputs and inspect the recorded history.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use embedded_hal::digital::{ErrorKind, ErrorType, InputPin, OutputPin};

use hydrobot::app::control_loop::{ControlLoop, Ports};
use hydrobot::app::events::Notice;
use hydrobot::app::ports::{Clock, Notifier, StorageError, StoragePort};
use hydrobot::config::SystemConfig;
use hydrobot::drivers::pump::{PumpActuator, PumpPolarity};
use hydrobot::sensors::moisture::{MoistureSensor, PolledLevel, SensorPolarity};

// ── Moisture input ────────────────────────────────────────────

const LEVEL_LOW: i8 = 0;
const LEVEL_HIGH: i8 = 1;
const LEVEL_FAIL: i8 = -1;

/// Scripted sensor line.  With the reference wiring (`WetLow`) a high
/// level reads as dry.
#[derive(Clone)]
pub struct MockInput {
    level: Arc<AtomicI8>,
    samples: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockInput {
    pub fn new() -> Self {
        Self {
            level: Arc::new(AtomicI8::new(LEVEL_LOW)),
            samples: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_dry(&self) {
        self.level.store(LEVEL_HIGH, Ordering::SeqCst);
    }

    pub fn set_wet(&self) {
        self.level.store(LEVEL_LOW, Ordering::SeqCst);
    }

    /// Every sample fails until another level is set.
    pub fn set_failing(&self) {
        self.level.store(LEVEL_FAIL, Ordering::SeqCst);
    }

    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }
}

impl ErrorType for MockInput {
    type Error = ErrorKind;
}

impl InputPin for MockInput {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        match self.level.load(Ordering::SeqCst) {
            LEVEL_FAIL => Err(ErrorKind::Other),
            level => Ok(level == LEVEL_HIGH),
        }
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

// ── Pump output ───────────────────────────────────────────────

/// Pump line that records every level it was successfully driven to.
#[derive(Clone)]
pub struct MockOutput {
    levels: Arc<Mutex<Vec<bool>>>,
    /// Writes of this level fail.
    failing_level: Arc<Mutex<Option<bool>>>,
}

#[allow(dead_code)]
impl MockOutput {
    pub fn new() -> Self {
        Self {
            levels: Arc::new(Mutex::new(Vec::new())),
            failing_level: Arc::new(Mutex::new(None)),
        }
    }

    pub fn fail_writes_of(&self, level: Option<bool>) {
        *self.failing_level.lock().unwrap() = level;
    }

    pub fn levels(&self) -> Vec<bool> {
        self.levels.lock().unwrap().clone()
    }

    pub fn last_level(&self) -> Option<bool> {
        self.levels.lock().unwrap().last().copied()
    }

    /// Number of times the line was driven to `on_level`.
    pub fn activations(&self, on_level: bool) -> usize {
        self.levels
            .lock()
            .unwrap()
            .iter()
            .filter(|l| **l == on_level)
            .count()
    }

    fn write(&mut self, level: bool) -> Result<(), ErrorKind> {
        if *self.failing_level.lock().unwrap() == Some(level) {
            return Err(ErrorKind::Other);
        }
        self.levels.lock().unwrap().push(level);
        Ok(())
    }
}

impl ErrorType for MockOutput {
    type Error = ErrorKind;
}

impl OutputPin for MockOutput {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}

// ── Clock ─────────────────────────────────────────────────────

pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

#[allow(dead_code)]
impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap()
    }
}

/// `2024-06-01 hh:mm:ss`.
#[allow(dead_code)]
pub fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    day(1).and_hms_opt(h, m, s).unwrap()
}

/// `2024-06-<d>`.
#[allow(dead_code)]
pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

// ── Notifier ──────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
    documents: Mutex<Vec<(String, Vec<u8>)>>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Notice) -> bool) -> usize {
        self.notices.lock().unwrap().iter().filter(|n| pred(n)).count()
    }

    pub fn documents(&self) -> Vec<(String, Vec<u8>)> {
        self.documents.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }

    fn send_document(&self, name: &str, contents: &[u8]) {
        self.documents
            .lock()
            .unwrap()
            .push((name.to_owned(), contents.to_vec()));
    }
}

// ── Storage ───────────────────────────────────────────────────

/// In-memory store that survives "reboots" (shared through `Arc`) and
/// can be told to fail writes.
#[derive(Default)]
pub struct MemStorage {
    data: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

#[allow(dead_code)]
impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn raw(&self, ns: &str, key: &str) -> Option<Vec<u8>> {
        self.data.lock().unwrap().get(&format!("{ns}::{key}")).cloned()
    }
}

impl StoragePort for MemStorage {
    fn read(&self, ns: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.raw(ns, key).ok_or(StorageError::NotFound)
    }

    fn write(&self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::IoError);
        }
        self.data
            .lock()
            .unwrap()
            .insert(format!("{ns}::{key}"), data.to_vec());
        Ok(())
    }

    fn delete(&self, ns: &str, key: &str) -> Result<(), StorageError> {
        self.data.lock().unwrap().remove(&format!("{ns}::{key}"));
        Ok(())
    }

    fn exists(&self, ns: &str, key: &str) -> bool {
        self.data.lock().unwrap().contains_key(&format!("{ns}::{key}"))
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// Config with a short pump run so tests stay fast.
pub fn test_config() -> SystemConfig {
    SystemConfig {
        watering_duration_ms: 20,
        sensor_timeout_ms: 60,
        ..SystemConfig::default()
    }
}

/// A control loop wired to mocks, plus handles on every mock.
pub struct Rig {
    pub control: Arc<ControlLoop>,
    pub sensor: MockInput,
    pub pump: MockOutput,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub storage: Arc<MemStorage>,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: SystemConfig) -> Self {
        Self::boot(config, Arc::new(MemStorage::new()), at(7, 0, 0))
    }

    /// Build a fresh control loop over existing storage, as after a reboot.
    pub fn boot(config: SystemConfig, storage: Arc<MemStorage>, now: NaiveDateTime) -> Self {
        let sensor = MockInput::new();
        let pump = MockOutput::new();
        let clock = Arc::new(ManualClock::new(now));
        let notifier = Arc::new(RecordingNotifier::default());

        let reader = MoistureSensor::new(
            Box::new(PolledLevel::new(
                Box::new(sensor.clone()),
                Duration::from_millis(u64::from(config.sensor_timeout_ms)),
            )),
            SensorPolarity::WetLow,
        );
        let actuator = PumpActuator::new(
            Box::new(pump.clone()),
            PumpPolarity::ActiveLow,
            clock.clone(),
        )
        .unwrap();

        let control = Arc::new(ControlLoop::new(
            config,
            reader,
            actuator,
            Ports {
                storage: storage.clone(),
                clock: clock.clone(),
                notifier: notifier.clone(),
            },
        ));

        Self {
            control,
            sensor,
            pump,
            clock,
            notifier,
            storage,
        }
    }

    /// Reboot over the same storage.
    pub fn reboot(&self, config: SystemConfig) -> Self {
        Self::boot(config, self.storage.clone(), self.clock.now())
    }

    /// Pump runs so far (reference wiring: low = on).
    pub fn pump_runs(&self) -> usize {
        self.pump.activations(false)
    }

    /// True when the last level written to the pump line is "off".
    pub fn pump_is_off(&self) -> bool {
        self.pump.last_level() == Some(true)
    }
}
