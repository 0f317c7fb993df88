//! Small persisted records: schedule, last-watered marker, check frequency.
//!
//! Each record is one JSON value under its own namespace/key.  Loads fall
//! back to the absent value (with a warning when the record exists but is
//! unreadable); saves surface every failure to the caller.

use chrono::NaiveDateTime;
use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::app::ports::{StorageError, StoragePort};
use crate::error::PersistenceFault;
use crate::schedule::TimeOfDay;

const SCHEDULE: (&str, &str) = ("schedule", "time");
const LAST_WATERED: (&str, &str) = ("pump", "last_watered");
const CHECK_FREQUENCY: (&str, &str) = ("control", "check_freq");

/// Read a JSON record.  `Ok(None)` when the key does not exist.
pub fn load_json<T: DeserializeOwned>(
    storage: &dyn StoragePort,
    namespace: &str,
    key: &str,
) -> Result<Option<T>, PersistenceFault> {
    let bytes = match storage.read(namespace, key) {
        Ok(bytes) => bytes,
        Err(StorageError::NotFound) => return Ok(None),
        Err(_) => return Err(PersistenceFault::ReadFailed),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|_| PersistenceFault::Corrupted)
}

/// Write a JSON record atomically.
pub fn save_json<T: Serialize + ?Sized>(
    storage: &dyn StoragePort,
    namespace: &str,
    key: &str,
    value: &T,
) -> Result<(), PersistenceFault> {
    let bytes = serde_json::to_vec(value).map_err(|_| PersistenceFault::EncodeFailed)?;
    storage
        .write(namespace, key, &bytes)
        .map_err(|_| PersistenceFault::WriteFailed)
}

fn load_or_default<T: DeserializeOwned>(
    storage: &dyn StoragePort,
    (namespace, key): (&str, &str),
) -> Option<T> {
    match load_json::<Option<T>>(storage, namespace, key) {
        Ok(value) => value.flatten(),
        Err(e) => {
            warn!("Persistence: {}/{} {}, using default", namespace, key, e);
            None
        }
    }
}

/// The persisted schedule.  Absent, `null` or unreadable all mean `None`.
pub fn load_schedule(storage: &dyn StoragePort) -> Option<TimeOfDay> {
    load_or_default(storage, SCHEDULE)
}

pub fn save_schedule(
    storage: &dyn StoragePort,
    schedule: Option<TimeOfDay>,
) -> Result<(), PersistenceFault> {
    save_json(storage, SCHEDULE.0, SCHEDULE.1, &schedule)
}

pub fn load_last_watered(storage: &dyn StoragePort) -> Option<NaiveDateTime> {
    load_or_default(storage, LAST_WATERED)
}

pub fn save_last_watered(
    storage: &dyn StoragePort,
    at: NaiveDateTime,
) -> Result<(), PersistenceFault> {
    save_json(storage, LAST_WATERED.0, LAST_WATERED.1, &at)
}

/// The operator-set moisture check frequency, if one was ever set.
pub fn load_check_frequency(storage: &dyn StoragePort) -> Option<u32> {
    load_or_default(storage, CHECK_FREQUENCY)
}

pub fn save_check_frequency(storage: &dyn StoragePort, secs: u32) -> Result<(), PersistenceFault> {
    save_json(storage, CHECK_FREQUENCY.0, CHECK_FREQUENCY.1, &secs)
}
