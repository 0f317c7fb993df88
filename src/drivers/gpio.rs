//! Digital GPIO lines behind the `embedded-hal` 1.0 traits.
//!
//! Configures pins with raw ESP-IDF sys calls and exposes them as
//! [`InputPin`] / [`OutputPin`], so the moisture sensor and the pump
//! driver only ever see the HAL traits.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: `gpio_config` / `gpio_get_level` / `gpio_set_level`, plus
//! an any-edge ISR that feeds the moisture [`EDGE_QUEUE`].
//! On host/test: levels live in an atomic table that tests drive with
//! [`sim_set_level`] and [`sim_edge`].

use core::fmt;

use embedded_hal::digital::{ErrorKind, ErrorType, InputPin, OutputPin};
use log::info;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use crate::pins;
#[cfg(not(target_os = "espidf"))]
use crate::sensors::edge::EDGE_QUEUE;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioError {
    /// Pin number outside the chip's GPIO range.
    InvalidPin(i32),
    ConfigFailed(i32),
    IsrInstallFailed(i32),
    WriteFailed(i32),
}

impl fmt::Display for GpioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPin(pin) => write!(f, "GPIO{} does not exist", pin),
            Self::ConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR install failed (rc={})", rc),
            Self::WriteFailed(rc) => write!(f, "GPIO write failed (rc={})", rc),
        }
    }
}

impl std::error::Error for GpioError {}

impl embedded_hal::digital::Error for GpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

// ── Host simulation ───────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
static SIM_LEVELS: [core::sync::atomic::AtomicBool; pins::MAX_GPIO as usize + 1] =
    [const { core::sync::atomic::AtomicBool::new(false) }; pins::MAX_GPIO as usize + 1];

/// Set the simulated level of a pin.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_level(pin: i32, high: bool) {
    if let Some(level) = SIM_LEVELS.get(pin as usize) {
        level.store(high, core::sync::atomic::Ordering::SeqCst);
    }
}

/// Current simulated level of a pin.
#[cfg(not(target_os = "espidf"))]
pub fn sim_level(pin: i32) -> bool {
    SIM_LEVELS
        .get(pin as usize)
        .is_some_and(|l| l.load(core::sync::atomic::Ordering::SeqCst))
}

/// Change a simulated input level and report it the way the edge ISR would.
#[cfg(not(target_os = "espidf"))]
pub fn sim_edge(pin: i32, high: bool, at_ms: u32) {
    sim_set_level(pin, high);
    EDGE_QUEUE.push(high, at_ms);
}

// ── GPIO pin ──────────────────────────────────────────────────

/// A configured GPIO line.
#[derive(Debug)]
pub struct GpioPin {
    num: i32,
}

fn check_pin(num: i32) -> Result<(), GpioError> {
    if (0..=pins::MAX_GPIO).contains(&num) {
        Ok(())
    } else {
        Err(GpioError::InvalidPin(num))
    }
}

impl GpioPin {
    /// Configure `num` as an input with the internal pull-up enabled
    /// (comparator modules have open-collector outputs).
    pub fn input(num: i32) -> Result<Self, GpioError> {
        check_pin(num)?;
        #[cfg(target_os = "espidf")]
        {
            let cfg = gpio_config_t {
                pin_bit_mask: 1u64 << num,
                mode: gpio_mode_t_GPIO_MODE_INPUT,
                pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
                pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
                intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
                ..Default::default()
            };
            // SAFETY: gpio_config reads the config struct only; called from
            // the boot path before any ISR is registered on this pin.
            let ret = unsafe { gpio_config(&cfg) };
            if ret != ESP_OK as i32 {
                return Err(GpioError::ConfigFailed(ret));
            }
        }
        info!("gpio: GPIO{} configured as input", num);
        Ok(Self { num })
    }

    /// Configure `num` as a push-pull output, driven to `initial_high`
    /// before the output driver is enabled.
    pub fn output(num: i32, initial_high: bool) -> Result<Self, GpioError> {
        check_pin(num)?;
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: setting the level of a not-yet-output pin only latches
            // the value the output driver will start with.
            unsafe { gpio_set_level(num, u32::from(initial_high)) };
            let cfg = gpio_config_t {
                pin_bit_mask: 1u64 << num,
                mode: gpio_mode_t_GPIO_MODE_OUTPUT,
                pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
                pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
                intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
                ..Default::default()
            };
            // SAFETY: as in `input`.
            let ret = unsafe { gpio_config(&cfg) };
            if ret != ESP_OK as i32 {
                return Err(GpioError::ConfigFailed(ret));
            }
        }
        #[cfg(not(target_os = "espidf"))]
        sim_set_level(num, initial_high);
        info!("gpio: GPIO{} configured as output", num);
        Ok(Self { num })
    }

    pub fn num(&self) -> i32 {
        self.num
    }

    #[cfg(target_os = "espidf")]
    fn read_level(&self) -> bool {
        // SAFETY: register read on a configured pin.
        (unsafe { gpio_get_level(self.num) }) != 0
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_level(&self) -> bool {
        sim_level(self.num)
    }

    #[cfg(target_os = "espidf")]
    fn write_level(&mut self, high: bool) -> Result<(), GpioError> {
        // SAFETY: register write on a configured output pin.
        let ret = unsafe { gpio_set_level(self.num, u32::from(high)) };
        if ret != ESP_OK as i32 {
            return Err(GpioError::WriteFailed(ret));
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn write_level(&mut self, high: bool) -> Result<(), GpioError> {
        sim_set_level(self.num, high);
        Ok(())
    }
}

impl ErrorType for GpioPin {
    type Error = GpioError;
}

impl InputPin for GpioPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.read_level())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.read_level())
    }
}

impl OutputPin for GpioPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write_level(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write_level(true)
    }
}

// ── Edge ISR ──────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn moisture_edge_isr(arg: *mut core::ffi::c_void) {
    let pin = arg as i32;
    // SAFETY: register reads; both are ISR-safe in ESP-IDF.
    let high = unsafe { gpio_get_level(pin) } != 0;
    let now_ms = (unsafe { esp_timer_get_time() } / 1_000) as u32;
    crate::sensors::edge::EDGE_QUEUE.push(high, now_ms);
}

/// Report every level change of `pin` into the moisture edge queue.
#[cfg(target_os = "espidf")]
pub fn install_edge_isr(pin: &GpioPin) -> Result<(), GpioError> {
    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed.  The handler only touches the
    // lock-free edge queue.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            return Err(GpioError::IsrInstallFailed(ret));
        }
        gpio_set_intr_type(pin.num, gpio_int_type_t_GPIO_INTR_ANYEDGE);
        let ret = gpio_isr_handler_add(
            pin.num,
            Some(moisture_edge_isr),
            pin.num as usize as *mut core::ffi::c_void,
        );
        if ret != ESP_OK as i32 {
            return Err(GpioError::IsrInstallFailed(ret));
        }
        gpio_intr_enable(pin.num);
    }
    info!("gpio: edge ISR installed on GPIO{}", pin.num);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn install_edge_isr(pin: &GpioPin) -> Result<(), GpioError> {
    info!("gpio(sim): edge ISR on GPIO{} simulated by sim_edge()", pin.num);
    Ok(())
}
