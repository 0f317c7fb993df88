//! Application core: domain orchestration behind port traits.
//!
//! This module contains the business rules for the Hydrobot system:
//! the serialized activate-and-log path, the operator entry points and
//! the two periodic cadences.  All interaction with hardware happens
//! through **port traits** defined in [`ports`], keeping this layer fully
//! testable without real peripherals.

pub mod cadence;
pub mod commands;
pub mod console;
pub mod control_loop;
pub mod events;
pub mod ports;
