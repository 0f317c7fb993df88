//! Periodic evaluation threads.
//!
//! Two independently clocked cadences drive the [`ControlLoop`]:
//!
//! | Cadence  | Interval                         | After watering        |
//! |----------|----------------------------------|-----------------------|
//! | schedule | `schedule_poll_secs` (30 s)      | `schedule_cooldown_secs` (60 s) |
//! | moisture | `check_frequency` (0 = disabled) | next interval         |
//!
//! A failed tick is notified and counted; from the
//! `fault_backoff_threshold`-th consecutive failure the interval doubles
//! per failure up to [`MAX_BACKOFF_FACTOR`] times the base.  A successful
//! tick resets the backoff and reports the recovery.
//!
//! Waits are cut short by the [`ShutdownSignal`]; a tick in progress is
//! never interrupted, so an activation always completes its off step
//! before the thread exits.

use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::drivers::task_pin::{self, Core};
use crate::error::Result;

use super::control_loop::{ControlLoop, TickOutcome};
use super::events::{CadenceId, Notice};

/// Upper bound on the backoff multiplier.
pub const MAX_BACKOFF_FACTOR: u32 = 16;

/// Granularity of the moisture cadence: how often it re-reads the check
/// frequency, and how often it looks again while disabled.
pub const DISABLED_RECHECK: Duration = Duration::from_secs(1);

const CADENCE_PRIORITY: u8 = 5;
const CADENCE_STACK_KB: usize = 16;

// ───────────────────────────────────────────────────────────────
// Shutdown signal
// ───────────────────────────────────────────────────────────────

/// Cooperative, process-wide stop request.
#[derive(Default)]
pub struct ShutdownSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every cadence to stop after its current tick.
    pub fn trigger(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cv.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `timeout` unless shutdown is requested first.
    /// Returns `true` when shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .cv
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

// ───────────────────────────────────────────────────────────────
// Fault backoff
// ───────────────────────────────────────────────────────────────

/// Consecutive-fault counter with exponential interval stretching.
#[derive(Debug, Clone)]
pub struct Backoff {
    threshold: u32,
    consecutive: u32,
}

impl Backoff {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    /// Count one failed tick.
    pub fn record_failure(&mut self) {
        self.consecutive = self.consecutive.saturating_add(1);
    }

    /// Count one good tick.  Returns `true` if this ended a failure streak.
    pub fn record_success(&mut self) -> bool {
        let recovered = self.consecutive > 0;
        self.consecutive = 0;
        recovered
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    /// Interval multiplier: 1 below the threshold, then 2, 4, 8 … capped.
    pub fn factor(&self) -> u32 {
        if self.consecutive < self.threshold {
            return 1;
        }
        let doublings = (self.consecutive - self.threshold + 1).min(MAX_BACKOFF_FACTOR.ilog2());
        (1u32 << doublings).min(MAX_BACKOFF_FACTOR)
    }

    pub fn interval(&self, base: Duration) -> Duration {
        base * self.factor()
    }
}

// ───────────────────────────────────────────────────────────────
// Cadence bodies
// ───────────────────────────────────────────────────────────────

/// Fold one tick result into the backoff, notifying faults and recoveries.
fn settle(
    control: &ControlLoop,
    cadence: CadenceId,
    backoff: &mut Backoff,
    result: Result<TickOutcome>,
) -> Option<TickOutcome> {
    match result {
        Ok(outcome) => {
            if backoff.record_success() {
                info!("Cadence({}): recovered", cadence);
                control.notifier().notify(&Notice::Recovered { cadence });
            }
            Some(outcome)
        }
        Err(error) => {
            backoff.record_failure();
            warn!(
                "Cadence({}): tick failed ({}), {} in a row, backoff x{}",
                cadence,
                error,
                backoff.consecutive_failures(),
                backoff.factor()
            );
            control.notifier().notify(&Notice::Fault { cadence, error });
            None
        }
    }
}

/// Schedule cadence body.  Returns when `shutdown` is triggered.
pub fn run_schedule_cadence(control: &ControlLoop, shutdown: &ShutdownSignal) {
    let cfg = control.config();
    let poll = Duration::from_secs(u64::from(cfg.schedule_poll_secs));
    let cooldown = Duration::from_secs(u64::from(cfg.schedule_cooldown_secs));
    let mut backoff = Backoff::new(cfg.fault_backoff_threshold);
    info!("Cadence(schedule): polling every {}s", poll.as_secs());

    while !shutdown.is_triggered() {
        let result = control.schedule_tick();
        let wait = match settle(control, CadenceId::Schedule, &mut backoff, result) {
            Some(outcome) if outcome.watered() => cooldown.max(poll),
            Some(_) => poll,
            None => backoff.interval(poll),
        };
        if shutdown.wait_timeout(wait) {
            break;
        }
    }
    info!("Cadence(schedule): stopped");
}

/// Moisture cadence body.  Returns when `shutdown` is triggered.
///
/// The check frequency is re-read every [`DISABLED_RECHECK`], so an
/// operator change takes effect without waiting out the old interval.
pub fn run_moisture_cadence(control: &ControlLoop, shutdown: &ShutdownSignal) {
    let mut backoff = Backoff::new(control.config().fault_backoff_threshold);
    let mut last_run = Instant::now();
    info!(
        "Cadence(moisture): check frequency {}s",
        control.check_frequency()
    );

    while !shutdown.wait_timeout(DISABLED_RECHECK) {
        let freq = control.check_frequency();
        if freq == 0 {
            continue;
        }
        let interval = backoff.interval(Duration::from_secs(u64::from(freq)));
        if last_run.elapsed() < interval {
            continue;
        }
        last_run = Instant::now();

        let result = control.moisture_tick();
        settle(control, CadenceId::Moisture, &mut backoff, result);
    }
    info!("Cadence(moisture): stopped");
}

// ───────────────────────────────────────────────────────────────
// Thread management
// ───────────────────────────────────────────────────────────────

/// Join handles for both cadence threads.
pub struct Cadences {
    schedule: JoinHandle<()>,
    moisture: JoinHandle<()>,
}

impl Cadences {
    /// Start both cadences on the application core.
    pub fn spawn(control: Arc<ControlLoop>, shutdown: Arc<ShutdownSignal>) -> io::Result<Self> {
        let schedule = {
            let control = Arc::clone(&control);
            let shutdown = Arc::clone(&shutdown);
            task_pin::spawn_on_core(
                Core::App,
                CADENCE_PRIORITY,
                CADENCE_STACK_KB,
                "sched-cadence\0",
                move || run_schedule_cadence(&control, &shutdown),
            )?
        };
        let moisture = task_pin::spawn_on_core(
            Core::App,
            CADENCE_PRIORITY,
            CADENCE_STACK_KB,
            "moist-cadence\0",
            move || run_moisture_cadence(&control, &shutdown),
        );
        let moisture = match moisture {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cadence: moisture thread failed to start ({})", e);
                return Err(e);
            }
        };
        Ok(Self { schedule, moisture })
    }

    /// Wait for both threads to exit.  Trigger the shutdown signal first.
    pub fn join(self) {
        for (name, handle) in [("schedule", self.schedule), ("moisture", self.moisture)] {
            if handle.join().is_err() {
                warn!("Cadence({}): thread panicked", name);
            }
        }
    }
}
