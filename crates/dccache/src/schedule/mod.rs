#![forbid(unsafe_code)]

//! Queues deciding when checks, proxies, trigger timers, discovery rules and
//! web tests run next.
//!
//! Queue membership is only changed here; the sync engine asks for a
//! requeue after it has changed something that affects scheduling.

mod availability;
mod checks;
mod heap;
mod proxies;
mod tasks;
mod timers;
mod worker;

pub use availability::{AvailabilityDiff, InterfaceOutcome};
pub use checks::{CheckOrder, CheckOutcome, CheckResult};
pub use heap::IndexedHeap;
pub use proxies::ProxyNextcheck;
pub use timers::{TimerKind, TriggerTimer};
pub use worker::{Unqueued, WorkerCapacity, WorkerClass, assign_class, preferred_class};

pub(crate) use availability::{activate_interface, deactivate_interface};
pub(crate) use checks::{
    claim_checks, dequeue_item, requeue_checks, set_item_state, update_item_queue,
};
pub(crate) use proxies::{claim_proxies, requeue_proxy, update_proxy_queue};
pub(crate) use tasks::{
    claim_drules, claim_httptests, requeue_drule, requeue_httptest, update_drule_queue,
    update_httptest_queue,
};
pub(crate) use timers::{
    claim_timers, pending_trend_timers, queue_timers, reschedule_timers, restore_timers,
};

use std::collections::HashMap;
use std::time::Duration;

/// Whole seconds of a configured duration.
pub(crate) fn seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

/// Queue membership of a schedulable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueState {
    #[default]
    Absent,
    Queued,
    /// Handed out to a worker, waiting for the requeue.
    Claimed,
}

/// Tie-break tier between checks due at the same second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum QueuePriority {
    High,
    #[default]
    Normal,
    Low,
}

/// Every scheduling queue of the cache.
#[derive(Debug, Default)]
pub struct Queues {
    pub(crate) checks: HashMap<WorkerClass, IndexedHeap<u64, CheckOrder>>,
    pub(crate) proxies: IndexedHeap<u64, (i64, u64)>,
    pub(crate) timers: IndexedHeap<u64, (i64, u64, i64)>,
    pub(crate) timer_entries: HashMap<u64, TriggerTimer>,
    pub(crate) drules: IndexedHeap<u64, i64>,
    pub(crate) httptests: IndexedHeap<u64, i64>,
}

impl Queues {
    pub(crate) fn check_queue(&mut self, class: WorkerClass) -> &mut IndexedHeap<u64, CheckOrder> {
        self.checks.entry(class).or_default()
    }

    /// Earliest due time in the queue of `class`.
    pub fn check_nextcheck(&self, class: WorkerClass) -> Option<i64> {
        self.checks
            .get(&class)
            .and_then(|queue| queue.peek())
            .map(|(_, order)| order.nextcheck)
    }

    pub fn check_queue_len(&self, class: WorkerClass) -> usize {
        self.checks.get(&class).map_or(0, IndexedHeap::len)
    }

    /// Earliest poll time of a passive proxy.
    pub fn proxy_nextcheck(&self) -> Option<i64> {
        self.proxies.peek().map(|(_, &(nextcheck, _))| nextcheck)
    }

    pub fn timer_nextcheck(&self) -> Option<i64> {
        self.timers.peek().map(|(_, &(exec_ts, _, _))| exec_ts)
    }

    pub fn timer_queue_len(&self) -> usize {
        self.timers.len()
    }

    pub fn drule_nextcheck(&self) -> Option<i64> {
        self.drules.peek().map(|(_, &nextcheck)| nextcheck)
    }

    pub fn httptest_nextcheck(&self) -> Option<i64> {
        self.httptests.peek().map(|(_, &nextcheck)| nextcheck)
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}
