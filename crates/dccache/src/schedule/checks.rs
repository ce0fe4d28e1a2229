#![forbid(unsafe_code)]

use super::worker::{Unqueued, WorkerCapacity, WorkerClass, assign_class};
use super::{QueuePriority, QueueState, Queues};
use crate::Error;
use crate::data::ConfigData;
use crate::domain::{Item, ItemFlags, ItemState, Schedule, update};
use crate::interval::{CheckInterval, IntervalError, NEVER};
use crate::notify::Notification;
use crate::snapshot::CheckSnapshot;
use tracing::{debug, trace, warn};

/// Heap key of a queued check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CheckOrder {
    pub nextcheck: i64,
    pub priority: QueuePriority,
    /// Checks sharing this key may be handed out by one claim.
    pub batch: u64,
    pub itemid: u64,
}

/// How a claimed check ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Succeed,
    NotSupported,
    AgentError,
    ConfigError,
    NetworkError,
    GatewayError,
    Timeout,
}

impl CheckOutcome {
    /// Whether the outcome points at an unreachable interface rather than at
    /// the check itself.
    pub fn is_network_error(self) -> bool {
        matches!(self, Self::NetworkError | Self::GatewayError | Self::Timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
    pub itemid: u64,
    pub outcome: CheckOutcome,
}

impl CheckResult {
    pub fn new(itemid: u64, outcome: CheckOutcome) -> Self {
        Self { itemid, outcome }
    }
}

/// Drop a check from whichever queue holds it.
pub(crate) fn dequeue_item(queues: &mut Queues, itemid: u64, schedule: &Schedule) {
    if schedule.queue == QueueState::Queued
        && let Some(class) = schedule.worker
        && let Some(queue) = queues.checks.get_mut(&class)
    {
        queue.remove(itemid);
    }
}

fn unqueue(data: &mut ConfigData, itemid: u64) {
    if let Some(item) = data.items.get_mut(itemid) {
        dequeue_item(&mut data.queues, itemid, &item.schedule);
        item.schedule.queue = QueueState::Absent;
    }
}

/// Record a state change of a check, notifying when the state flips.
pub(crate) fn set_item_state(
    data: &mut ConfigData,
    itemid: u64,
    state: ItemState,
    error: &str,
) -> Result<bool, Error> {
    let Some(item) = data.items.get_mut(itemid) else {
        return Ok(false);
    };
    let error = match state {
        ItemState::Normal => "",
        ItemState::NotSupported => error,
    };
    let error_changed = data.strpool.replace_opt(true, &mut item.error, error)?;
    if !update(&mut item.state, state) {
        return Ok(error_changed);
    }
    data.notifications.push(Notification::ItemState {
        itemid,
        state,
        error: error.to_owned(),
    });
    Ok(true)
}

fn resolve_interval(data: &ConfigData, item: &Item) -> Result<CheckInterval, IntervalError> {
    let delay = data
        .macros
        .expand(item.hostid, &item.delay)
        .map_err(|_| IntervalError::UnresolvedMacro(item.delay.to_string()))?;
    CheckInterval::parse(&delay)
}

/// Put a check where its current configuration says it belongs.
///
/// Checks that are claimed keep their state; only the class and interval
/// the requeue will use are refreshed.
pub(crate) fn update_item_queue(data: &mut ConfigData, itemid: u64, now: i64) -> Result<(), Error> {
    let Some(item) = data.items.get(itemid) else {
        return Ok(());
    };
    let Some(host) = data.hosts.get(item.hostid) else {
        unqueue(data, itemid);
        return Ok(());
    };
    if !item.is_enabled() || !host.is_monitored() || item.flags == ItemFlags::Prototype {
        unqueue(data, itemid);
        return Ok(());
    }

    let class = match assign_class(item, host, &data.options.workers) {
        Ok(class) => class,
        Err(Unqueued::NotPolled) => {
            unqueue(data, itemid);
            return Ok(());
        }
        Err(Unqueued::NoWorker(class)) => {
            unqueue(data, itemid);
            let message = format!("no worker configured for checks of the {}", class.name());
            return set_item_state(data, itemid, ItemState::NotSupported, &message).map(drop);
        }
    };

    let interval = match resolve_interval(data, item) {
        Ok(interval) => interval,
        Err(err) => {
            warn!(itemid, %err, "check will not run until its interval is fixed");
            unqueue(data, itemid);
            if let Some(item) = data.items.get_mut(itemid) {
                item.schedule.nextcheck = NEVER;
                item.schedule.interval = None;
                item.schedule.worker = Some(class);
            }
            return set_item_state(data, itemid, ItemState::NotSupported, &err.to_string())
                .map(drop);
        }
    };

    let tz = data.settings.timezone;
    let refresh = data.settings.refresh_unsupported;
    let disable_until = data
        .interfaces
        .get(item.interfaceid)
        .map_or(0, |interface| interface.availability.disable_until);
    let seed = if class.seeds_by_interface() {
        item.interfaceid
    } else {
        itemid
    };

    let (class, nextcheck) = if item.schedule.unreachable && disable_until > now {
        let class = if class.can_become_unreachable()
            && data.options.workers.workers(WorkerClass::Unreachable) > 0
        {
            WorkerClass::Unreachable
        } else {
            class
        };
        (class, interval.nextcheck_unreachable(disable_until, tz))
    } else if item.is_supported() {
        (class, interval.nextcheck(seed, now, tz))
    } else if refresh == 0 {
        trace!(itemid, "unsupported check is not retried");
        unqueue(data, itemid);
        return Ok(());
    } else {
        let retry = CheckInterval {
            simple: refresh,
            ..CheckInterval::default()
        };
        (class, retry.nextcheck(seed, now, tz))
    };

    let batch = item.interfaceid;
    let Some(item) = data.items.get_mut(itemid) else {
        return Ok(());
    };
    item.schedule.interval = Some(interval.simple);
    if item.schedule.queue == QueueState::Claimed {
        item.schedule.worker = Some(class);
        return Ok(());
    }

    dequeue_item(&mut data.queues, itemid, &item.schedule);
    item.schedule.worker = Some(class);
    item.schedule.nextcheck = nextcheck;
    item.schedule.queue = QueueState::Queued;
    let order = CheckOrder {
        nextcheck,
        priority: item.schedule.priority,
        batch,
        itemid,
    };
    data.queues.check_queue(class).push(itemid, order);
    trace!(itemid, worker = class.name(), nextcheck, "check queued");
    Ok(())
}

/// Hand out the due checks of `class`, marking them claimed.
///
/// Classes that batch by interface only return checks sharing the first
/// check's interface. Checks found on failing interfaces move to the
/// unreachable class, recovered ones move back.
pub(crate) fn claim_checks(
    data: &mut ConfigData,
    class: WorkerClass,
    now: i64,
) -> Result<Vec<CheckSnapshot>, Error> {
    let limit = class.max_items();
    let mut claimed = Vec::new();
    let mut batch = None;

    while claimed.len() < limit {
        let queue = data.queues.check_queue(class);
        let Some((itemid, order)) = queue.peek().map(|(itemid, order)| (itemid, *order)) else {
            break;
        };
        if order.nextcheck > now {
            break;
        }
        if class.batches_by_interface() && batch.is_some_and(|batch| batch != order.batch) {
            break;
        }
        queue.pop();

        let Some(item) = data.items.get_mut(itemid) else {
            continue;
        };
        item.schedule.queue = QueueState::Absent;
        let Some(host) = data.hosts.get(item.hostid) else {
            continue;
        };
        if !item.is_supported() && data.settings.refresh_unsupported == 0 {
            continue;
        }
        if host.maintenance.suppresses_data() {
            trace!(itemid, hostid = host.hostid, "check skipped during maintenance");
            update_item_queue(data, itemid, now)?;
            continue;
        }

        let disable_until = data
            .interfaces
            .get(item.interfaceid)
            .map_or(0, |interface| interface.availability.disable_until);
        if class.can_become_unreachable()
            && disable_until > now
            && data.options.workers.workers(WorkerClass::Unreachable) > 0
        {
            item.schedule.unreachable = true;
            debug!(itemid, disable_until, "check moved to the unreachable pollers");
            update_item_queue(data, itemid, now)?;
            continue;
        }
        if class == WorkerClass::Unreachable && disable_until == 0 {
            item.schedule.unreachable = false;
            item.schedule.priority = QueuePriority::High;
            debug!(itemid, "check moved back from the unreachable pollers");
            update_item_queue(data, itemid, now)?;
            continue;
        }

        item.schedule.queue = QueueState::Claimed;
        batch = Some(order.batch);
        if let Some(snapshot) = CheckSnapshot::capture(data, itemid) {
            claimed.push(snapshot);
        }
    }

    if !claimed.is_empty() {
        trace!(worker = class.name(), count = claimed.len(), "checks claimed");
    }
    Ok(claimed)
}

/// Return claimed checks to their queues.
///
/// Network class errors keep the check on its failing interface at low
/// priority; any other outcome restores the regular class, at high
/// priority when the check comes back from the unreachable pollers.
pub(crate) fn requeue_checks(
    data: &mut ConfigData,
    results: &[CheckResult],
    now: i64,
) -> Result<(), Error> {
    for result in results {
        let Some(item) = data.items.get_mut(result.itemid) else {
            continue;
        };
        if item.schedule.queue != QueueState::Claimed {
            debug!(itemid = result.itemid, "requeue of a check that is not claimed ignored");
            continue;
        }
        item.schedule.queue = QueueState::Absent;
        let was_unreachable = item.schedule.worker == Some(WorkerClass::Unreachable);
        if result.outcome.is_network_error() {
            item.schedule.unreachable = true;
            item.schedule.priority = QueuePriority::Low;
        } else {
            item.schedule.unreachable = false;
            item.schedule.priority = if was_unreachable {
                QueuePriority::High
            } else {
                QueuePriority::Normal
            };
        }
        update_item_queue(data, result.itemid, now)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earlier_checks_sort_first_then_priority() {
        let order = |nextcheck, priority, itemid| CheckOrder {
            nextcheck,
            priority,
            batch: 0,
            itemid,
        };
        let mut orders = vec![
            order(20, QueuePriority::High, 1),
            order(10, QueuePriority::Low, 2),
            order(10, QueuePriority::High, 3),
            order(10, QueuePriority::Normal, 4),
        ];
        orders.sort();
        let ids: Vec<_> = orders.iter().map(|order| order.itemid).collect();
        assert_eq!(ids, vec![3, 4, 2, 1]);
    }

    #[test]
    fn network_class_outcomes() {
        assert!(CheckOutcome::Timeout.is_network_error());
        assert!(CheckOutcome::GatewayError.is_network_error());
        assert!(!CheckOutcome::NotSupported.is_network_error());
        assert!(!CheckOutcome::AgentError.is_network_error());
    }
}
