//! Durable watering event log.
//!
//! Events are kept in memory and in fixed-size pages on the
//! [`StoragePort`] under the `events` namespace:
//!
//! ```text
//!   events::p0   [e0 .. e31]     full, never rewritten
//!   events::p1   [e32 .. e63]    full, never rewritten
//!   events::p2   [e64 .. e70]    last page, rewritten by every append
//! ```
//!
//! Each page is a postcard-encoded `heapless::Vec<WateringEvent, 32>`, so
//! one append is one atomic storage write of at most one page.  Memory is
//! only updated after that write succeeds: once `append` returns `Ok`, the
//! event survives a restart and is visible to every later `query`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDateTime, Timelike};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{StorageError, StoragePort};
use crate::error::PersistenceFault;
use crate::safety::TriggerKind;
use crate::sensors::moisture::MoistureReading;

/// Events per storage page.
pub const PAGE_CAPACITY: usize = 32;

const EVENTS_NAMESPACE: &str = "events";

type Page = heapless::Vec<WateringEvent, PAGE_CAPACITY>;

/// What a log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Pump activation requested by the operator.
    Manual,
    /// Pump activation from the daily schedule.
    Scheduled,
    /// Pump activation from the moisture cadence.
    MoistureTriggered,
    /// Explicit check-moisture command; the pump did not run.
    MoistureCheck,
}

impl From<TriggerKind> for EventKind {
    fn from(t: TriggerKind) -> Self {
        match t {
            TriggerKind::Manual => Self::Manual,
            TriggerKind::Scheduled => Self::Scheduled,
            TriggerKind::MoistureTriggered => Self::MoistureTriggered,
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::MoistureTriggered => write!(f, "moisture"),
            Self::MoistureCheck => write!(f, "check"),
        }
    }
}

/// One immutable log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WateringEvent {
    #[serde(with = "chrono::naive::serde::ts_seconds")]
    pub at: NaiveDateTime,
    pub kind: EventKind,
    /// `None` when an activation proceeded despite a sensor fault.
    pub moisture: Option<MoistureReading>,
}

impl WateringEvent {
    /// Timestamps are kept at minute resolution.
    pub fn new(at: NaiveDateTime, kind: EventKind, moisture: Option<MoistureReading>) -> Self {
        Self {
            at: truncate_to_minute(at),
            kind,
            moisture,
        }
    }

    /// Pump activations, as opposed to moisture checks.
    pub fn is_activation(&self) -> bool {
        self.kind != EventKind::MoistureCheck
    }
}

fn truncate_to_minute(at: NaiveDateTime) -> NaiveDateTime {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// Append-only event log over a [`StoragePort`].
pub struct EventRecorder {
    storage: Arc<dyn StoragePort>,
    log: Mutex<Log>,
}

/// In-memory log plus the page the next append lands on.
///
/// `tail_len` counts the trailing events of `events` that live in page
/// `tail_page`.  A page that could not be loaded is never the tail, so it
/// is never rewritten.
struct Log {
    events: Vec<WateringEvent>,
    tail_page: usize,
    tail_len: usize,
}

impl EventRecorder {
    /// Load every readable page, up to the first missing one.  An
    /// unreadable or corrupt page is skipped with a warning and left as
    /// it is in storage; appends continue on a fresh page after the last
    /// one stored.
    pub fn open(storage: Arc<dyn StoragePort>) -> Self {
        let mut events = Vec::new();
        let mut tail_page = 0usize;
        let mut tail_len = 0usize;
        let mut skipped = 0usize;
        let mut index = 0usize;
        loop {
            let key = page_key(index);
            let page = match storage.read(EVENTS_NAMESPACE, &key) {
                Ok(bytes) => postcard::from_bytes::<Page>(&bytes).map_err(|_| {
                    warn!("Recorder: page {} corrupted, skipped", index);
                }),
                Err(StorageError::NotFound) => break,
                Err(e) => {
                    warn!("Recorder: page {} unreadable ({}), skipped", index, e);
                    Err(())
                }
            };
            match page {
                Ok(page) if page.is_full() => {
                    tail_page = index + 1;
                    tail_len = 0;
                    events.extend(page);
                }
                Ok(page) => {
                    tail_page = index;
                    tail_len = page.len();
                    events.extend(page);
                }
                Err(()) => {
                    skipped += 1;
                    tail_page = index + 1;
                    tail_len = 0;
                }
            }
            index += 1;
        }
        if skipped > 0 {
            warn!("Recorder: {} events loaded, {} pages skipped", events.len(), skipped);
        } else {
            info!("Recorder: {} events loaded", events.len());
        }
        Self {
            storage,
            log: Mutex::new(Log {
                events,
                tail_page,
                tail_len,
            }),
        }
    }

    /// Durably append one event.
    ///
    /// Timestamps never go backwards in the log: an event older than the
    /// last entry (wall clock stepped back) is stamped with the last
    /// entry's time.
    pub fn append(&self, mut event: WateringEvent) -> Result<(), PersistenceFault> {
        let mut log = self.lock();

        if let Some(last) = log.events.last() {
            if event.at < last.at {
                warn!(
                    "Recorder: clock went backwards ({} < {}), clamping",
                    event.at, last.at
                );
                event.at = last.at;
            }
        }

        let start = log.events.len() - log.tail_len;
        let mut page = Page::new();
        for e in log.events[start..].iter().chain(core::iter::once(&event)) {
            page.push(*e).map_err(|_| PersistenceFault::EncodeFailed)?;
        }

        let index = log.tail_page;
        let bytes = postcard::to_allocvec(&page).map_err(|_| PersistenceFault::EncodeFailed)?;
        self.storage
            .write(EVENTS_NAMESPACE, &page_key(index), &bytes)
            .map_err(|e| {
                warn!("Recorder: page {} write failed ({})", index, e);
                PersistenceFault::WriteFailed
            })?;

        log.events.push(event);
        log.tail_len += 1;
        if log.tail_len == PAGE_CAPACITY {
            log.tail_page += 1;
            log.tail_len = 0;
        }
        Ok(())
    }

    /// Every event with `at >= since`, oldest first.
    pub fn query(&self, since: NaiveDateTime) -> Vec<WateringEvent> {
        let log = self.lock();
        let from = log.events.partition_point(|e| e.at < since);
        log.events[from..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    pub fn last(&self) -> Option<WateringEvent> {
        self.lock().events.last().copied()
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn page_key(index: usize) -> String {
    format!("p{index}")
}
