//! Log-based notifier adapter.
//!
//! Implements [`Notifier`] by writing operator notices to the ESP-IDF
//! logger (UART / USB-CDC in production).  A chat-bot adapter would
//! implement the same trait.

use log::{info, warn};

use crate::app::events::Notice;
use crate::app::ports::Notifier;

/// Adapter that logs every [`Notice`] to the serial console.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        match notice {
            Notice::Fault { .. } => warn!("NOTICE | {}", notice),
            _ => info!("NOTICE | {}", notice),
        }
    }

    fn send_document(&self, name: &str, contents: &[u8]) {
        info!("DOC | {} ({} bytes)", name, contents.len());
        for line in String::from_utf8_lossy(contents).lines() {
            info!("DOC | {}", line);
        }
    }
}
