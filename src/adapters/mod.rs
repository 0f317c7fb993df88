//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements  | Connects to                   |
//! |--------------|-------------|-------------------------------|
//! | `log_sink`   | Notifier    | Serial log output             |
//! | `nvs`        | StoragePort | NVS / in-memory store         |
//! | `time`       | Clock       | newlib wall clock / `chrono`  |
//!
//! The digital lines live in [`crate::drivers::gpio`]; the ports see them
//! through the `embedded-hal` traits.

pub mod log_sink;
pub mod nvs;
pub mod time;
