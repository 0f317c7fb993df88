//! Interrupt-driven moisture level tracking.
//!
//! The GPIO ISR pushes `(level, at_ms)` reports into a lock-free
//! [`EdgeQueue`]; [`EdgeLevel`] drains it on every read and keeps the
//! debounced level.
//!
//! ```text
//! ┌──────────┐  push   ┌──────────────┐  drain   ┌───────────┐
//! │ GPIO ISR │────────▶│  EdgeQueue   │─────────▶│ EdgeLevel │
//! └──────────┘         │ (lock-free)  │          └───────────┘
//!                      └──────────────┘
//! ```
//!
//! A report is collapsed when it repeats the accepted level or arrives
//! within the debounce window of the last accepted transition.  A
//! collapsed report that disagrees with the accepted level marks the level
//! stale; the read that drained it then takes a fresh sample of the line.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use log::{debug, warn};

use super::LevelSource;
use crate::app::ports::DigitalInput;
use crate::error::SensorFault;

/// Maximum number of pending edge reports.
const EDGE_QUEUE_CAP: usize = 16;

/// Edge reports from the moisture GPIO ISR.
pub static EDGE_QUEUE: EdgeQueue = EdgeQueue::new();

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// The ISR writes (produces), the moisture reader drains (consumes).
// Each slot is a pair of atomics; the producer fills the slot before
// publishing it with a Release store of `head`.

/// Single-producer single-consumer queue of `(level, at_ms)` reports.
pub struct EdgeQueue {
    head: AtomicU8,
    tail: AtomicU8,
    levels: [AtomicBool; EDGE_QUEUE_CAP],
    stamps: [AtomicU32; EDGE_QUEUE_CAP],
    overflowed: AtomicBool,
}

impl Default for EdgeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeQueue {
    pub const fn new() -> Self {
        Self {
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
            levels: [const { AtomicBool::new(false) }; EDGE_QUEUE_CAP],
            stamps: [const { AtomicU32::new(0) }; EDGE_QUEUE_CAP],
            overflowed: AtomicBool::new(false),
        }
    }

    /// Push a report.  Safe to call from ISR context (lock-free).
    /// Returns `false` if the queue is full; the overflow is remembered
    /// until the consumer next drains.
    pub fn push(&self, level: bool, at_ms: u32) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let next_head = (head + 1) % EDGE_QUEUE_CAP as u8;

        if next_head == tail {
            self.overflowed.store(true, Ordering::Release);
            return false;
        }

        self.levels[head as usize].store(level, Ordering::Relaxed);
        self.stamps[head as usize].store(at_ms, Ordering::Relaxed);
        self.head.store(next_head, Ordering::Release);
        true
    }

    /// Pop the oldest report.
    pub fn pop(&self) -> Option<(bool, u32)> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        let level = self.levels[tail as usize].load(Ordering::Relaxed);
        let at_ms = self.stamps[tail as usize].load(Ordering::Relaxed);
        self.tail
            .store((tail + 1) % EDGE_QUEUE_CAP as u8, Ordering::Release);
        Some((level, at_ms))
    }

    /// Returns and clears the overflow flag.
    pub fn take_overflow(&self) -> bool {
        self.overflowed.swap(false, Ordering::AcqRel)
    }

    /// Number of pending reports.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed) as usize;
        let tail = self.tail.load(Ordering::Relaxed) as usize;
        (head + EDGE_QUEUE_CAP - tail) % EDGE_QUEUE_CAP
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Debounced level tracker fed by an [`EdgeQueue`].
pub struct EdgeLevel {
    queue: &'static EdgeQueue,
    /// Used for the seed sample, overflow recovery and stale confirmation.
    pin: Box<dyn DigitalInput>,
    debounce_ms: u32,
    current: Option<bool>,
    last_accepted_ms: Option<u32>,
    stale: bool,
}

impl EdgeLevel {
    /// Seeds the level from one sample of `pin`.  A failed seed is not an
    /// error: the first read retries it.
    pub fn new(queue: &'static EdgeQueue, mut pin: Box<dyn DigitalInput>, debounce_ms: u32) -> Self {
        let current = match pin.sample() {
            Ok(level) => Some(level),
            Err(e) => {
                warn!("Moisture(edge): seed sample failed ({})", e);
                None
            }
        };
        Self {
            queue,
            pin,
            debounce_ms,
            current,
            last_accepted_ms: None,
            stale: false,
        }
    }

    fn resample(&mut self) {
        match self.pin.sample() {
            Ok(level) => self.current = Some(level),
            Err(e) => warn!("Moisture(edge): resample failed ({})", e),
        }
    }

    fn accept(&mut self, level: bool, at_ms: u32) {
        let Some(current) = self.current else {
            self.current = Some(level);
            self.last_accepted_ms = Some(at_ms);
            return;
        };

        let within_debounce = self
            .last_accepted_ms
            .is_some_and(|last| at_ms.wrapping_sub(last) < self.debounce_ms);

        if level == current {
            return;
        }
        if within_debounce {
            debug!("Moisture(edge): bounce at {}ms collapsed", at_ms);
            self.stale = true;
            return;
        }

        self.current = Some(level);
        self.last_accepted_ms = Some(at_ms);
        self.stale = false;
    }
}

impl LevelSource for EdgeLevel {
    fn level(&mut self) -> Result<bool, SensorFault> {
        if self.queue.take_overflow() {
            warn!("Moisture(edge): edge queue overflowed, re-sampling the line");
            while self.queue.pop().is_some() {}
            self.resample();
            self.last_accepted_ms = None;
        }

        while let Some((level, at_ms)) = self.queue.pop() {
            self.accept(level, at_ms);
        }

        if self.stale {
            self.stale = false;
            self.resample();
        }
        if self.current.is_none() {
            self.resample();
        }
        self.current.ok_or(SensorFault::NotReady)
    }
}
