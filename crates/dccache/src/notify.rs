#![forbid(unsafe_code)]

use crate::domain::ItemState;
use crate::schedule::AvailabilityDiff;
use parking_lot::Mutex;
use tracing::{info, warn};

/// Event for another subsystem, queued under the cache lock and delivered
/// after it is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Interface availability changed.
    Availability(AvailabilityDiff),
    /// A proxy group moved a host to another proxy.
    ProxyRelocated { hostid: u64, from: u64, to: u64 },
    /// A check became supported or unsupported.
    ItemState {
        itemid: u64,
        state: ItemState,
        error: String,
    },
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, batch: Vec<Notification>);
}

/// Sink writing every event to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, batch: Vec<Notification>) {
        for notification in batch {
            match notification {
                Notification::Availability(diff) => info!(
                    interfaceid = diff.interfaceid,
                    hostid = diff.hostid,
                    available = ?diff.available,
                    error = %diff.error,
                    "interface availability changed"
                ),
                Notification::ProxyRelocated { hostid, from, to } => {
                    info!(hostid, from, to, "host relocated to another proxy")
                }
                Notification::ItemState {
                    itemid,
                    state: ItemState::NotSupported,
                    error,
                } => warn!(itemid, %error, "check became not supported"),
                Notification::ItemState { itemid, .. } => {
                    info!(itemid, "check became supported again")
                }
            }
        }
    }
}

/// Sink collecting events in memory until taken.
#[derive(Debug, Default)]
pub struct MemorySink(Mutex<Vec<Notification>>);

impl MemorySink {
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.0.lock())
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, batch: Vec<Notification>) {
        self.0.lock().extend(batch);
    }
}
