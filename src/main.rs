//! Hydrobot Firmware: Main Entry Point
//!
//! Hexagonal architecture with two cadence threads and a serial console.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  GpioPin (sensor)   GpioPin (pump)   NvsAdapter   SystemClock  │
//! │  LogNotifier        serial console                             │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              ControlLoop (pure logic)                  │    │
//! │  │  Schedule · Safety governor · Pump · Event recorder    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Schedule cadence · Moisture cadence  (core-pinned threads)    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};

use hydrobot::adapters::log_sink::LogNotifier;
use hydrobot::adapters::nvs::NvsAdapter;
use hydrobot::adapters::time::SystemClock;
use hydrobot::app::cadence::{Cadences, ShutdownSignal};
use hydrobot::app::console;
use hydrobot::app::control_loop::{ControlLoop, Ports};
use hydrobot::app::ports::{Clock, StoragePort};
use hydrobot::config::{self, SystemConfig};
use hydrobot::drivers::gpio::{self, GpioPin};
use hydrobot::drivers::pump::PumpActuator;
use hydrobot::drivers::task_pin::{self, Core};
use hydrobot::sensors::edge::{EDGE_QUEUE, EdgeLevel};
use hydrobot::sensors::moisture::{MoistureSensor, PolledLevel};
use hydrobot::sensors::{LevelSource, SensorMode};

const HEARTBEAT: Duration = Duration::from_secs(3600);
const CONSOLE_PRIORITY: u8 = 3;
const CONSOLE_STACK_KB: usize = 8;

/// Build the moisture reader for the configured backend.
fn build_sensor(config: &SystemConfig) -> Result<MoistureSensor> {
    let pin = GpioPin::input(config.sensor_gpio).context("moisture sensor GPIO")?;
    let source: Box<dyn LevelSource> = match config.sensor_mode {
        SensorMode::Poll => Box::new(PolledLevel::new(
            Box::new(pin),
            Duration::from_millis(u64::from(config.sensor_timeout_ms)),
        )),
        SensorMode::Edge => {
            gpio::install_edge_isr(&pin).context("moisture edge ISR")?;
            Box::new(EdgeLevel::new(&EDGE_QUEUE, Box::new(pin), config.debounce_ms))
        }
    };
    info!(
        "Moisture sensor on GPIO{} ({:?}, {:?})",
        config.sensor_gpio, config.sensor_mode, config.sensor_polarity
    );
    Ok(MoistureSensor::new(source, config.sensor_polarity))
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Hydrobot v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Storage + config ───────────────────────────────────
    let storage: Arc<dyn StoragePort> = Arc::new(
        NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {e}"))?,
    );
    let config = config::load(storage.as_ref());
    if !config::is_stored(storage.as_ref()) {
        if let Err(e) = config::save(storage.as_ref(), &config) {
            warn!("Config: defaults not persisted ({})", e);
        }
    }

    let clock = Arc::new(SystemClock::new());
    if !clock.is_synced() {
        warn!("Wall clock not set; schedule times will be wrong until it is");
    }
    let clock: Arc<dyn Clock> = clock;

    // ── 3. Hardware ───────────────────────────────────────────
    let sensor = build_sensor(&config)?;
    let pump_line = GpioPin::output(config.pump_gpio, config.pump_polarity.off_level())
        .context("pump relay GPIO")?;
    let pump = PumpActuator::new(Box::new(pump_line), config.pump_polarity, Arc::clone(&clock))
        .context("pump release at boot")?;

    // ── 4. Control loop + cadences ────────────────────────────
    let control = Arc::new(ControlLoop::new(
        config,
        sensor,
        pump,
        Ports {
            storage,
            clock,
            notifier: Arc::new(LogNotifier::new()),
        },
    ));
    control.announce();

    let shutdown = Arc::new(ShutdownSignal::new());
    let cadences = Cadences::spawn(Arc::clone(&control), Arc::clone(&shutdown))
        .context("cadence threads")?;

    // ── 5. Serial console ─────────────────────────────────────
    {
        let control = Arc::clone(&control);
        let shutdown = Arc::clone(&shutdown);
        let spawned = task_pin::spawn_on_core(
            Core::Pro,
            CONSOLE_PRIORITY,
            CONSOLE_STACK_KB,
            "console\0",
            move || {
                let input = BufReader::new(std::io::stdin());
                if let Err(e) = console::run_console(&control, &shutdown, input, std::io::stdout())
                {
                    warn!("Console: stopped ({})", e);
                }
            },
        );
        if let Err(e) = spawned {
            warn!("Console unavailable ({}); running unattended", e);
        }
    }

    info!("System ready.");

    // ── 6. Idle until /shutdown on the console ────────────────
    while !shutdown.wait_timeout(HEARTBEAT) {
        info!(
            "Heartbeat: {} events logged, last watered {}",
            control.recorder().len(),
            control
                .last_watered()
                .map_or_else(|| "never".into(), |t| t.format("%Y-%m-%d %H:%M").to_string())
        );
    }

    cadences.join();
    if let Err(e) = control.shutdown() {
        error!("Pump release at shutdown failed: {}", e);
    }
    info!("Controller stopped.");
    Ok(())
}
