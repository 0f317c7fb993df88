//! Actuator drivers, GPIO lines, and thread helpers.

pub mod gpio;
pub mod pump;
pub mod task_pin;
