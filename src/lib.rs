//! Hydrobot irrigation controller library.
//!
//! Exposes the pure-logic modules for integration testing and for the
//! firmware binary. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod persistence;
pub mod pins;
pub mod recorder;
pub mod report;
pub mod safety;
pub mod schedule;

pub mod adapters;
pub mod drivers;
pub mod sensors;
